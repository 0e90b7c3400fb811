use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies an environment inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub project: String,
    pub environment_id: i32,
}

impl EnvironmentRef {
    pub fn new(project: impl Into<String>, environment_id: i32) -> Self {
        Self {
            project: project.into(),
            environment_id,
        }
    }

    pub fn resource(&self, resource_id: i32) -> ResourceRef {
        ResourceRef {
            project: self.project.clone(),
            environment_id: self.environment_id,
            resource_id,
        }
    }
}

impl fmt::Display for EnvironmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.environment_id)
    }
}

/// The (project, environment, resource) triple that uniquely identifies an
/// environment resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub project: String,
    pub environment_id: i32,
    pub resource_id: i32,
}

impl ResourceRef {
    pub fn new(project: impl Into<String>, environment_id: i32, resource_id: i32) -> Self {
        Self {
            project: project.into(),
            environment_id,
            resource_id,
        }
    }

    pub fn environment(&self) -> EnvironmentRef {
        EnvironmentRef {
            project: self.project.clone(),
            environment_id: self.environment_id,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.project, self.environment_id, self.resource_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvironmentResourceType {
    Undefined,
    Generic,
    VirtualMachine,
    Kubernetes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentReference {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A Kubernetes-backed resource registered in an environment, as returned by
/// the `distributedtask/environments/{id}/providers/kubernetes` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesResource {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<EnvironmentResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub service_endpoint_id: Uuid,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_reference: Option<EnvironmentReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesResourceCreateParameters {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub service_endpoint_id: Uuid,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KubernetesResourceCreateParameters {
    pub fn new(name: impl Into<String>, service_endpoint_id: Uuid) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            cluster_name: None,
            service_endpoint_id,
            tags: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.cluster_name = Some(cluster_name.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Mutable fields of a Kubernetes resource. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesResourcePatchParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl KubernetesResourcePatchParameters {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.tags.is_none()
    }
}
