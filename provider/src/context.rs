use crate::reconciler::KubernetesResourceReconciler;
use azdo::{AzdoConfig, ClientResult, HttpTaskAgentClient, TaskAgentClient};
use std::sync::Arc;

/// The configured provider: one authenticated client shared by every
/// resource operation. Pass it explicitly; there is no global instance.
#[derive(Clone)]
pub struct ProviderContext {
    client: Arc<dyn TaskAgentClient>,
}

impl ProviderContext {
    pub fn new(client: Arc<dyn TaskAgentClient>) -> Self {
        Self { client }
    }

    pub fn from_config(config: AzdoConfig) -> ClientResult<Self> {
        Ok(Self::new(Arc::new(HttpTaskAgentClient::new(config)?)))
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::from_config(AzdoConfig::from_env()?)
    }

    pub fn client(&self) -> &dyn TaskAgentClient {
        self.client.as_ref()
    }

    pub fn reconciler(&self) -> KubernetesResourceReconciler {
        KubernetesResourceReconciler::new(Arc::clone(&self.client))
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("client", &self.client.client_name())
            .finish()
    }
}
