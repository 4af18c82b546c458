//! MongoDB repositories, behind the `mongodb` cargo feature.
//!
//! MongoDB rejects document keys containing `.` and keys starting with
//! `$`, so property-map keys are escaped with the metadata codec on
//! write and unescaped on read; the rest of the platform never sees
//! escaped keys. Timestamps are stored as native BSON dates so range
//! filters and sorting work server-side.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::{Client, Collection, Database};

use crate::config::DocumentStoreConfig;
use crate::error::{GatesyncError, Result};
use crate::events::criteria::EventCriteria;
use crate::events::event::{Event, EventId, LatestEvent, ReferenceType};
use crate::metadata;
use crate::pagination::{Page, Pageable, SortOrder};
use crate::repository::{EventRepository, LatestEventRepository};

const EVENTS_COLLECTION: &str = "events";
const LATEST_COLLECTION: &str = "events_latest";

// ═══════════════════════════════════════════════════════════════════════════════
// Event Log
// ═══════════════════════════════════════════════════════════════════════════════

/// Event log repository backed by the `events` collection.
#[derive(Clone)]
pub struct MongoEventRepository {
    collection: Collection<Document>,
}

impl MongoEventRepository {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(EVENTS_COLLECTION),
        }
    }

    /// Open a client from configuration.
    pub async fn connect(config: &DocumentStoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri).await?;
        Ok(Self::new(&client.database(&config.database)))
    }
}

#[async_trait]
impl EventRepository for MongoEventRepository {
    async fn create(&self, event: Event) -> Result<Event> {
        // The unique _id index refuses duplicates; the log never
        // overwrites.
        self.collection
            .insert_one(event_to_document(&event)?)
            .await?;
        Ok(event)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .map(document_to_event)
            .transpose()
    }

    async fn search(
        &self,
        criteria: &EventCriteria,
        pageable: Option<Pageable>,
        order: SortOrder,
    ) -> Result<Page<Event>> {
        let filter = criteria_to_filter(criteria);
        let total = self.collection.count_documents(filter.clone()).await?;

        let sort = match order {
            SortOrder::Ascending => doc! { "created_at": 1, "_id": 1 },
            SortOrder::Descending => doc! { "created_at": -1, "_id": -1 },
        };

        let mut find = self.collection.find(filter).sort(sort);
        if let Some(pageable) = pageable {
            find = find.skip(pageable.offset()).limit(pageable.size as i64);
        }

        let documents: Vec<Document> = find.await?.try_collect().await?;
        let content = documents
            .into_iter()
            .map(document_to_event)
            .collect::<Result<Vec<_>>>()?;

        match pageable {
            Some(pageable) => Ok(Page::new(content, pageable.page, pageable.size, total)),
            None => Ok(Page::new(content, 1, total.max(1), total)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    async fn delete_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<EventId>> {
        let path = format!(
            "properties.{}",
            metadata::escape_key(reference_type.property_key())
        );
        let filter = doc! { path: reference_id };

        let documents: Vec<Document> = self
            .collection
            .find(filter.clone())
            .projection(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;

        let ids: Vec<EventId> = documents
            .iter()
            .filter_map(|document| document.get_str("_id").ok())
            .map(EventId::from)
            .collect();

        self.collection.delete_many(filter).await?;
        Ok(ids)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Latest Projection
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest-projection repository backed by the `events_latest`
/// collection.
#[derive(Clone)]
pub struct MongoLatestEventRepository {
    collection: Collection<Document>,
}

impl MongoLatestEventRepository {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(LATEST_COLLECTION),
        }
    }
}

#[async_trait]
impl LatestEventRepository for MongoLatestEventRepository {
    async fn create_or_update(&self, latest: LatestEvent) -> Result<LatestEvent> {
        let document = event_to_document(latest.event())?;
        self.collection
            .replace_one(doc! { "_id": latest.key() }, document)
            .upsert(true)
            .await?;
        Ok(latest)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<LatestEvent>> {
        self.collection
            .find_one(doc! { "_id": key })
            .await?
            .map(|document| Ok(LatestEvent::from_stored(document_to_event(document)?)))
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.collection.delete_one(doc! { "_id": key }).await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════════════════════════

fn encode_error<E: std::error::Error + Send + Sync + 'static>(error: E) -> GatesyncError {
    GatesyncError::storage("failed to encode event document").with_source(error)
}

fn decode_error<E: std::error::Error + Send + Sync + 'static>(error: E) -> GatesyncError {
    GatesyncError::storage("failed to decode event document").with_source(error)
}

fn event_to_document(event: &Event) -> Result<Document> {
    let mut document = bson::to_document(event).map_err(encode_error)?;

    // Keyed by _id like every other collection.
    document.remove("id");
    document.insert("_id", event.id().as_str());

    // Property keys escaped for the backend's key restrictions.
    let escaped = metadata::escape_keys(Some(event.properties().clone())).unwrap_or_default();
    document.insert("properties", bson::to_bson(&escaped).map_err(encode_error)?);

    // Native dates, so the window filter and sort run server-side.
    document.insert(
        "created_at",
        BsonDateTime::from_millis(event.created_at().timestamp_millis()),
    );
    document.insert(
        "updated_at",
        BsonDateTime::from_millis(event.updated_at().timestamp_millis()),
    );

    Ok(document)
}

fn document_to_event(mut document: Document) -> Result<Event> {
    if let Some(id) = document.remove("_id") {
        document.insert("id", id);
    }

    for key in ["created_at", "updated_at"] {
        let rendered = document
            .get_datetime(key)
            .map_err(decode_error)?
            .try_to_rfc3339_string()
            .map_err(decode_error)?;
        document.insert(key, rendered);
    }

    let event: Event = bson::from_document(document).map_err(decode_error)?;

    let properties = metadata::unescape_keys(Some(event.properties().clone())).unwrap_or_default();
    Ok(Event::from_parts(
        event.id().clone(),
        event.event_type(),
        event.payload().map(str::to_string),
        event.parent_id().cloned(),
        properties,
        event.environments().clone(),
        event.created_at(),
        event.updated_at(),
    ))
}

fn criteria_to_filter(criteria: &EventCriteria) -> Document {
    let mut filter = Document::new();

    let mut window = Document::new();
    if let Some(from) = criteria.from() {
        window.insert("$gte", BsonDateTime::from_millis(from));
    }
    if let Some(to) = criteria.to() {
        window.insert("$lt", BsonDateTime::from_millis(to));
    }
    if !window.is_empty() {
        filter.insert("created_at", window);
    }

    if !criteria.types().is_empty() {
        let tags: Vec<Bson> = criteria
            .types()
            .iter()
            .map(|event_type| Bson::String(event_type.as_str().to_string()))
            .collect();
        filter.insert("type", doc! { "$in": tags });
    }

    for (key, value) in criteria.properties() {
        filter.insert(
            format!("properties.{}", metadata::escape_key(key)),
            value.as_str(),
        );
    }

    // $in on an array field matches any element: the intersection test.
    if !criteria.environments().is_empty() {
        filter.insert(
            "environments",
            doc! { "$in": criteria.environments().to_vec() },
        );
    }

    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::EventType;

    #[test]
    fn test_criteria_filter_shape() {
        let criteria = EventCriteria::builder()
            .from(1_000)
            .event_type(EventType::ApiDeployed)
            .property("forms.id", "f1")
            .environment("env-1")
            .build();

        let filter = criteria_to_filter(&criteria);

        assert!(filter.get_document("created_at").unwrap().contains_key("$gte"));
        assert!(filter.contains_key("properties.forms__dot__id"));
        assert!(filter.get_document("type").unwrap().contains_key("$in"));
        assert!(filter.get_document("environments").unwrap().contains_key("$in"));
    }
}
