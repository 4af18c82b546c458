//! Resource records carried in event payloads.

pub mod api;
pub mod debug;
pub mod dictionary;
pub mod organization;
pub mod user;

pub use api::{
    Api, ApiDefinition, DefinitionV2, DefinitionV4, DefinitionVersion, FlowV2, FlowV4, PlanStatus,
    PlanV2, PlanV4,
};
pub use debug::{DebugApi, DebugRequest, DebugResponse};
pub use dictionary::{Dictionary, DictionaryType};
pub use organization::Organization;
pub use user::User;
