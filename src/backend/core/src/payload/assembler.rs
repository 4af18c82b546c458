//! Version-aware assembly of deployable API snapshots.
//!
//! The stored management definition carries no plans or flows. Before an
//! API change is logged, the assembler merges the live plans and flows
//! into a definition of the API's own schema generation and re-serializes
//! it; the resulting snapshot is what gateway nodes deploy. Any parse or
//! serialization failure aborts the surrounding event creation — a
//! partial snapshot is never persisted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::{GatesyncError, Result};
use crate::model::{Api, DefinitionV2, DefinitionV4, DefinitionVersion, FlowV2, FlowV4, PlanStatus, PlanV2, PlanV4};

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of truth for an API's live plans.
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn plans_v2(&self, api_id: &str) -> Result<Vec<PlanV2>>;

    async fn plans_v4(&self, api_id: &str) -> Result<Vec<PlanV4>>;
}

/// Source of truth for an API's live flows.
///
/// Flows are returned in execution order; the assembler never re-sorts
/// them.
#[async_trait]
pub trait FlowSource: Send + Sync {
    async fn flows_v2(&self, api_id: &str) -> Result<Vec<FlowV2>>;

    async fn flows_v4(&self, api_id: &str) -> Result<Vec<FlowV4>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Assembler
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds the immutable, version-correct snapshot embedded in deploy
/// events.
pub struct PayloadAssembler {
    plans: Arc<dyn PlanSource>,
    flows: Arc<dyn FlowSource>,
}

impl PayloadAssembler {
    pub fn new(plans: Arc<dyn PlanSource>, flows: Arc<dyn FlowSource>) -> Self {
        Self { plans, flows }
    }

    /// Render the deployable snapshot for `api`.
    ///
    /// Returns a clone of the record whose `definition` holds the full
    /// gateway definition of the API's generation. Closed plans are
    /// excluded; flow order is taken verbatim from the flow source. The
    /// two schema generations are never mixed: the branch is decided by
    /// `definition_version` alone.
    #[instrument(skip(self, api), fields(api_id = %api.id))]
    pub async fn assemble_api(&self, api: &Api) -> Result<Api> {
        let stored = api.definition.as_deref().ok_or_else(|| {
            GatesyncError::invalid_input(format!("api {} has no stored definition", api.id))
        })?;

        let rendered = match api.definition_version {
            DefinitionVersion::V2 => {
                let mut definition: DefinitionV2 = serde_json::from_str(stored)?;
                definition.plans = self
                    .plans
                    .plans_v2(&api.id)
                    .await?
                    .into_iter()
                    .filter(|plan| plan.status != PlanStatus::Closed)
                    .collect();
                definition.flows = self.flows.flows_v2(&api.id).await?;
                serde_json::to_string(&definition)?
            }
            DefinitionVersion::V4 => {
                let mut definition: DefinitionV4 = serde_json::from_str(stored)?;
                definition.plans = self
                    .plans
                    .plans_v4(&api.id)
                    .await?
                    .into_iter()
                    .filter(|plan| plan.status != PlanStatus::Closed)
                    .collect();
                definition.flows = self.flows.flows_v4(&api.id).await?;
                serde_json::to_string(&definition)?
            }
        };

        let mut snapshot = api.clone();
        snapshot.definition = Some(rendered);
        Ok(snapshot)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPlans {
        v2: Vec<PlanV2>,
        v4: Vec<PlanV4>,
    }

    #[async_trait]
    impl PlanSource for FixedPlans {
        async fn plans_v2(&self, _api_id: &str) -> Result<Vec<PlanV2>> {
            Ok(self.v2.clone())
        }

        async fn plans_v4(&self, _api_id: &str) -> Result<Vec<PlanV4>> {
            Ok(self.v4.clone())
        }
    }

    struct FixedFlows {
        v2: Vec<FlowV2>,
        v4: Vec<FlowV4>,
    }

    #[async_trait]
    impl FlowSource for FixedFlows {
        async fn flows_v2(&self, _api_id: &str) -> Result<Vec<FlowV2>> {
            Ok(self.v2.clone())
        }

        async fn flows_v4(&self, _api_id: &str) -> Result<Vec<FlowV4>> {
            Ok(self.v4.clone())
        }
    }

    fn plan_v2(id: &str, status: PlanStatus) -> PlanV2 {
        PlanV2 {
            id: id.to_string(),
            name: format!("plan {}", id),
            security: "API_KEY".to_string(),
            status,
            order: 0,
            paths: Default::default(),
            extras: Default::default(),
        }
    }

    fn flow_v2(name: &str) -> FlowV2 {
        FlowV2 {
            id: None,
            name: Some(name.to_string()),
            enabled: true,
            extras: Default::default(),
        }
    }

    fn api_v2(definition: &str) -> Api {
        Api {
            id: "api-1".to_string(),
            name: "echo".to_string(),
            version: "1.0".to_string(),
            definition_version: DefinitionVersion::V2,
            definition: Some(definition.to_string()),
            deployed_at: None,
            extras: Default::default(),
        }
    }

    fn assembler(plans: FixedPlans, flows: FixedFlows) -> PayloadAssembler {
        PayloadAssembler::new(Arc::new(plans), Arc::new(flows))
    }

    const STORED_V2: &str = r#"{"id":"api-1","name":"echo","version":"1.0"}"#;

    #[tokio::test]
    async fn test_closed_plans_are_excluded() {
        let assembler = assembler(
            FixedPlans {
                v2: vec![
                    plan_v2("keyless", PlanStatus::Published),
                    plan_v2("retired", PlanStatus::Closed),
                    plan_v2("staging", PlanStatus::Staging),
                ],
                v4: vec![],
            },
            FixedFlows { v2: vec![], v4: vec![] },
        );

        let snapshot = assembler.assemble_api(&api_v2(STORED_V2)).await.unwrap();
        let definition: DefinitionV2 =
            serde_json::from_str(snapshot.definition.as_deref().unwrap()).unwrap();

        let ids: Vec<&str> = definition.plans.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["keyless", "staging"]);
    }

    #[tokio::test]
    async fn test_flow_order_is_preserved() {
        let assembler = assembler(
            FixedPlans { v2: vec![], v4: vec![] },
            FixedFlows {
                v2: vec![flow_v2("zeta"), flow_v2("alpha"), flow_v2("mid")],
                v4: vec![],
            },
        );

        let snapshot = assembler.assemble_api(&api_v2(STORED_V2)).await.unwrap();
        let definition: DefinitionV2 =
            serde_json::from_str(snapshot.definition.as_deref().unwrap()).unwrap();

        let names: Vec<&str> = definition
            .flows
            .iter()
            .filter_map(|f| f.name.as_deref())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_v4_api_uses_v4_sources_only() {
        let assembler = assembler(
            FixedPlans {
                v2: vec![plan_v2("v2-only", PlanStatus::Published)],
                v4: vec![PlanV4 {
                    id: "v4-plan".to_string(),
                    name: "v4 plan".to_string(),
                    security: "KEY_LESS".to_string(),
                    status: PlanStatus::Published,
                    flows: vec![],
                    extras: Default::default(),
                }],
            },
            FixedFlows { v2: vec![], v4: vec![] },
        );

        let mut api = api_v2(r#"{"id":"api-1","name":"echo","apiVersion":"1.0"}"#);
        api.definition_version = DefinitionVersion::V4;

        let snapshot = assembler.assemble_api(&api).await.unwrap();
        let definition: DefinitionV4 =
            serde_json::from_str(snapshot.definition.as_deref().unwrap()).unwrap();

        assert_eq!(definition.plans.len(), 1);
        assert_eq!(definition.plans[0].id, "v4-plan");
    }

    #[tokio::test]
    async fn test_unparseable_definition_is_fatal() {
        let assembler = assembler(
            FixedPlans { v2: vec![], v4: vec![] },
            FixedFlows { v2: vec![], v4: vec![] },
        );

        let error = assembler
            .assemble_api(&api_v2("{not a definition"))
            .await
            .unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::SerializationError);
    }

    #[tokio::test]
    async fn test_unknown_definition_fields_are_kept() {
        let assembler = assembler(
            FixedPlans { v2: vec![], v4: vec![] },
            FixedFlows { v2: vec![], v4: vec![] },
        );

        let stored = r#"{"id":"api-1","name":"echo","version":"1.0","proxy":{"strip_context_path":true}}"#;
        let snapshot = assembler.assemble_api(&api_v2(stored)).await.unwrap();
        let rendered: serde_json::Value =
            serde_json::from_str(snapshot.definition.as_deref().unwrap()).unwrap();

        assert_eq!(rendered["proxy"]["strip_context_path"], true);
    }
}
