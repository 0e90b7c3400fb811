use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Desired configuration of one `azuredevops_environment_resource_kubernetes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub project_id: String,
    pub environment_id: i32,
    pub service_endpoint_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ResourceConfig {
    pub fn new(
        project_id: impl Into<String>,
        environment_id: i32,
        service_endpoint_id: Uuid,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            environment_id,
            service_endpoint_id,
            name: name.into(),
            namespace: None,
            cluster_name: None,
            tags: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.cluster_name = Some(cluster_name.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "project_id",
            });
        }

        if self.environment_id <= 0 {
            return Err(ValidationError::InvalidField {
                field: "environment_id",
                message: format!("must be a positive integer, got {}", self.environment_id),
            });
        }

        if self.service_endpoint_id.is_nil() {
            return Err(ValidationError::MissingField {
                field: "service_endpoint_id",
            });
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }

        for (field, value) in [
            ("namespace", &self.namespace),
            ("cluster_name", &self.cluster_name),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(ValidationError::InvalidField {
                    field,
                    message: "must not be blank when set".to_string(),
                });
            }
        }

        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ValidationError::InvalidField {
                field: "tags",
                message: "tags must not be blank".to_string(),
            });
        }

        Ok(())
    }

    /// Tags are a set; order and duplicates carry no meaning.
    pub fn normalized_tags(&self) -> Vec<String> {
        normalize_tags(&self.tags)
    }
}

pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = tags.iter().map(|t| t.trim().to_string()).collect();
    tags.sort();
    tags.dedup();
    tags
}
