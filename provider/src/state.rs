//! Typed resource state and the string-keyed snapshot it is stored in.
//!
//! The snapshot mirrors the flat `attribute -> string` layout of a Terraform
//! state file. Conversion between the two happens only in
//! [`ResourceState::to_instance`] and [`ResourceState::from_instance`];
//! everything else works with the typed struct.

use crate::config::{normalize_tags, ResourceConfig};
use azdo::{KubernetesResource, ResourceRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::ParseIntError;
use thiserror::Error;
use uuid::Uuid;

pub const RESOURCE_TYPE: &str = "azuredevops_environment_resource_kubernetes";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Missing attribute `{name}`")]
    MissingAttribute { name: String },

    #[error("Attribute `{name}` is not an integer ({value:?}): {source}")]
    InvalidInteger {
        name: String,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Attribute `{name}` is not a UUID ({value:?}): {source}")]
    InvalidUuid {
        name: String,
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("Expected resource type {expected}, found {actual}")]
    WrongType { expected: String, actual: String },
}

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: i32,
    pub project_id: String,
    pub environment_id: i32,
    pub service_endpoint_id: Uuid,
    pub name: String,
    pub namespace: Option<String>,
    pub cluster_name: Option<String>,
    pub tags: Vec<String>,
}

impl ResourceState {
    /// Projects a remote resource into state. The project and environment
    /// are taken from the request because the API does not echo the project.
    pub fn from_remote(
        project_id: impl Into<String>,
        environment_id: i32,
        resource: KubernetesResource,
    ) -> Self {
        Self {
            id: resource.id,
            project_id: project_id.into(),
            environment_id,
            service_endpoint_id: resource.service_endpoint_id,
            name: resource.name,
            namespace: resource.namespace,
            cluster_name: resource.cluster_name,
            tags: normalize_tags(&resource.tags),
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.project_id.clone(), self.environment_id, self.id)
    }

    pub fn to_config(&self) -> ResourceConfig {
        ResourceConfig {
            project_id: self.project_id.clone(),
            environment_id: self.environment_id,
            service_endpoint_id: self.service_endpoint_id,
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            cluster_name: self.cluster_name.clone(),
            tags: self.tags.clone(),
        }
    }

    pub fn to_instance(&self) -> ResourceInstance {
        let mut attributes = BTreeMap::new();
        attributes.insert("id".to_string(), self.id.to_string());
        attributes.insert("project_id".to_string(), self.project_id.clone());
        attributes.insert(
            "environment_id".to_string(),
            self.environment_id.to_string(),
        );
        attributes.insert(
            "service_endpoint_id".to_string(),
            self.service_endpoint_id.to_string(),
        );
        attributes.insert("name".to_string(), self.name.clone());
        if let Some(namespace) = &self.namespace {
            attributes.insert("namespace".to_string(), namespace.clone());
        }
        if let Some(cluster_name) = &self.cluster_name {
            attributes.insert("cluster_name".to_string(), cluster_name.clone());
        }
        attributes.insert("tags.#".to_string(), self.tags.len().to_string());
        for (i, tag) in self.tags.iter().enumerate() {
            attributes.insert(format!("tags.{}", i), tag.clone());
        }

        ResourceInstance {
            resource_type: RESOURCE_TYPE.to_string(),
            primary: InstanceState {
                id: self.id.to_string(),
                attributes,
            },
        }
    }

    pub fn from_instance(instance: &ResourceInstance) -> StateResult<Self> {
        if instance.resource_type != RESOURCE_TYPE {
            return Err(StateError::WrongType {
                expected: RESOURCE_TYPE.to_string(),
                actual: instance.resource_type.clone(),
            });
        }

        let primary = &instance.primary;
        let id = parse_int("id", &primary.id)?;
        let project_id = primary.required("project_id")?.to_string();
        let environment_id = parse_int("environment_id", primary.required("environment_id")?)?;

        let raw_endpoint = primary.required("service_endpoint_id")?;
        let service_endpoint_id =
            Uuid::parse_str(raw_endpoint).map_err(|source| StateError::InvalidUuid {
                name: "service_endpoint_id".to_string(),
                value: raw_endpoint.to_string(),
                source,
            })?;

        let tag_count = match primary.attributes.get("tags.#") {
            Some(raw) => parse_int("tags.#", raw)?.max(0) as usize,
            None => 0,
        };
        let tags = (0..tag_count)
            .map(|i| primary.required(&format!("tags.{}", i)).map(str::to_string))
            .collect::<StateResult<Vec<_>>>()?;

        Ok(Self {
            id,
            project_id,
            environment_id,
            service_endpoint_id,
            name: primary.required("name")?.to_string(),
            namespace: primary.attributes.get("namespace").cloned(),
            cluster_name: primary.attributes.get("cluster_name").cloned(),
            tags,
        })
    }
}

fn parse_int(name: &str, value: &str) -> StateResult<i32> {
    value.parse().map_err(|source| StateError::InvalidInteger {
        name: name.to_string(),
        value: value.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl InstanceState {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn required(&self, name: &str) -> StateResult<&str> {
        self.attribute(name)
            .ok_or_else(|| StateError::MissingAttribute {
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstance {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub primary: InstanceState,
}

/// All managed resources keyed by address (`<type>.<name>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceInstance>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&ResourceInstance> {
        self.resources.get(address)
    }

    pub fn state(&self, address: &str) -> StateResult<Option<ResourceState>> {
        self.get(address)
            .map(ResourceState::from_instance)
            .transpose()
    }

    pub fn set(&mut self, address: impl Into<String>, state: &ResourceState) {
        self.resources.insert(address.into(), state.to_instance());
        self.serial += 1;
    }

    pub fn remove(&mut self, address: &str) -> Option<ResourceInstance> {
        let removed = self.resources.remove(address);
        if removed.is_some() {
            self.serial += 1;
        }
        removed
    }

    pub fn addresses(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ResourceInstance)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, instance)| instance.resource_type == resource_type)
            .map(|(address, instance)| (address.as_str(), instance))
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
