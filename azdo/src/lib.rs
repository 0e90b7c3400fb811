pub mod client;
pub mod config;
pub mod http;
pub mod memory;
pub mod types;

pub use client::{ClientError, ClientResult, TaskAgentClient};
pub use config::{AzdoConfig, RetryConfig};
pub use http::HttpTaskAgentClient;
pub use memory::InMemoryTaskAgentClient;
pub use types::{
    EnvironmentRef, EnvironmentReference, EnvironmentResourceType, KubernetesResource,
    KubernetesResourceCreateParameters, KubernetesResourcePatchParameters, ResourceRef,
};

pub mod prelude {
    pub use crate::client::*;
    pub use crate::config::*;
    pub use crate::http::*;
    pub use crate::memory::*;
    pub use crate::types::*;
}
