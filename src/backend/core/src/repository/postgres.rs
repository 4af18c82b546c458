//! PostgreSQL repositories, via sqlx.
//!
//! Properties are stored as JSONB (`@>` containment implements the
//! AND-matched property filters) and environments as `text[]` (`&&`
//! overlap implements the scope intersection test).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};

use crate::config::DatabaseConfig;
use crate::error::{GatesyncError, Result};
use crate::events::criteria::EventCriteria;
use crate::events::event::{Event, EventId, EventType, LatestEvent, ReferenceType};
use crate::pagination::{Page, Pageable, SortOrder};
use crate::repository::{EventRepository, LatestEventRepository};

const EVENT_COLUMNS: &str =
    "id, event_type, payload, parent_id, properties, environments, created_at, updated_at";

// ═══════════════════════════════════════════════════════════════════════════════
// Event Log
// ═══════════════════════════════════════════════════════════════════════════════

/// Event log repository backed by the `events` table.
#[derive(Clone)]
pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Get the connection pool, e.g. to share it with the latest
    /// repository.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `events` table and its indexes if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                payload TEXT,
                parent_id TEXT,
                properties JSONB NOT NULL DEFAULT '{}'::jsonb,
                environments TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS events_created_at_idx ON events (created_at DESC)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS events_properties_idx ON events USING GIN (properties)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn create(&self, event: Event) -> Result<Event> {
        sqlx::query(
            r#"
            INSERT INTO events (id, event_type, payload, parent_id, properties, environments, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id().as_str())
        .bind(event.event_type().as_str())
        .bind(event.payload())
        .bind(event.parent_id().map(EventId::as_str))
        .bind(Json(event.properties().clone()))
        .bind(event.environments().iter().cloned().collect::<Vec<String>>())
        .bind(event.created_at())
        .bind(event.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(event)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    async fn search(
        &self,
        criteria: &EventCriteria,
        pageable: Option<Pageable>,
        order: SortOrder,
    ) -> Result<Page<Event>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM events WHERE TRUE");
        push_filters(&mut count, criteria)?;
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM events WHERE TRUE",
            EVENT_COLUMNS
        ));
        push_filters(&mut query, criteria)?;
        query.push(match order {
            SortOrder::Ascending => " ORDER BY created_at ASC, id ASC",
            SortOrder::Descending => " ORDER BY created_at DESC, id DESC",
        });
        if let Some(pageable) = pageable {
            query
                .push(" LIMIT ")
                .push_bind(pageable.size as i64)
                .push(" OFFSET ")
                .push_bind(pageable.offset() as i64);
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let content = rows.iter().map(row_to_event).collect::<Result<Vec<_>>>()?;

        let total = total as u64;
        match pageable {
            Some(pageable) => Ok(Page::new(content, pageable.page, pageable.size, total)),
            None => Ok(Page::new(content, 1, total.max(1), total)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<EventId>> {
        let rows = sqlx::query("DELETE FROM events WHERE properties ->> $1 = $2 RETURNING id")
            .bind(reference_type.property_key())
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Ok(EventId::new(row.try_get::<String, _>("id")?)))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Latest Projection
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest-projection repository backed by the `events_latest` table.
#[derive(Clone)]
pub struct PostgresLatestEventRepository {
    pool: PgPool,
}

impl PostgresLatestEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `events_latest` table if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events_latest (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                payload TEXT,
                parent_id TEXT,
                properties JSONB NOT NULL DEFAULT '{}'::jsonb,
                environments TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LatestEventRepository for PostgresLatestEventRepository {
    async fn create_or_update(&self, latest: LatestEvent) -> Result<LatestEvent> {
        let event = latest.event();
        sqlx::query(
            r#"
            INSERT INTO events_latest (id, event_type, payload, parent_id, properties, environments, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                payload = EXCLUDED.payload,
                parent_id = EXCLUDED.parent_id,
                properties = EXCLUDED.properties,
                environments = EXCLUDED.environments,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id().as_str())
        .bind(event.event_type().as_str())
        .bind(event.payload())
        .bind(event.parent_id().map(EventId::as_str))
        .bind(Json(event.properties().clone()))
        .bind(event.environments().iter().cloned().collect::<Vec<String>>())
        .bind(event.created_at())
        .bind(event.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<LatestEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM events_latest WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(|row| Ok(LatestEvent::from_stored(row_to_event(row)?)))
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM events_latest WHERE id = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════════════════════════

fn row_to_event(row: &PgRow) -> Result<Event> {
    let id: String = row.try_get("id")?;
    let type_tag: String = row.try_get("event_type")?;
    let event_type = EventType::parse(&type_tag)
        .ok_or_else(|| GatesyncError::storage(format!("unknown event type tag: {}", type_tag)))?;
    let payload: Option<String> = row.try_get("payload")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let Json(properties): Json<HashMap<String, String>> = row.try_get("properties")?;
    let environments: Vec<String> = row.try_get("environments")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Event::from_parts(
        EventId::new(id),
        event_type,
        payload,
        parent_id.map(EventId::new),
        properties,
        environments.into_iter().collect(),
        created_at,
        updated_at,
    ))
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, criteria: &EventCriteria) -> Result<()> {
    if let Some(from) = criteria.from() {
        builder
            .push(" AND created_at >= ")
            .push_bind(millis_to_datetime(from)?);
    }
    if let Some(to) = criteria.to() {
        builder
            .push(" AND created_at < ")
            .push_bind(millis_to_datetime(to)?);
    }
    if !criteria.types().is_empty() {
        let tags: Vec<String> = criteria
            .types()
            .iter()
            .map(|event_type| event_type.as_str().to_string())
            .collect();
        builder.push(" AND event_type = ANY(").push_bind(tags).push(")");
    }
    if !criteria.properties().is_empty() {
        builder
            .push(" AND properties @> ")
            .push_bind(Json(criteria.properties().clone()));
    }
    if !criteria.environments().is_empty() {
        builder
            .push(" AND environments && ")
            .push_bind(criteria.environments().to_vec());
    }
    Ok(())
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| GatesyncError::invalid_input(format!("timestamp out of range: {}", millis)))
}
