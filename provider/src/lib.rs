pub mod config;
pub mod context;
pub mod error;
pub mod reconciler;
pub mod schema;
pub mod state;
pub mod verify;

pub use config::ResourceConfig;
pub use context::ProviderContext;
pub use error::{ReconcileError, ReconcileResult, ValidationError};
pub use reconciler::{parse_import_id, ApplyOutcome, KubernetesResourceReconciler, ReadOutcome};
pub use schema::{AttributeKind, AttributeSchema, Plan, ATTRIBUTES};
pub use state::{
    InstanceState, ResourceInstance, ResourceState, StateError, StateResult, StateSnapshot,
    RESOURCE_TYPE,
};
pub use verify::{
    verify_all_destroyed, verify_all_destroyed_with_poll, verify_exists, wait_until_destroyed,
    DestroyPoll, VerifyError, VerifyResult,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::context::*;
    pub use crate::error::*;
    pub use crate::reconciler::*;
    pub use crate::schema::*;
    pub use crate::state::*;
    pub use crate::verify::*;
}
