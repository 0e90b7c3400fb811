use crate::config::ResourceConfig;
use crate::state::ResourceState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Required,
    Optional,
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub kind: AttributeKind,
    /// Changing the attribute replaces the resource.
    pub force_new: bool,
    pub description: &'static str,
}

pub const ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema {
        name: "id",
        kind: AttributeKind::Computed,
        force_new: false,
        description: "Server-assigned ID of the environment resource",
    },
    AttributeSchema {
        name: "project_id",
        kind: AttributeKind::Required,
        force_new: true,
        description: "The project the environment belongs to",
    },
    AttributeSchema {
        name: "environment_id",
        kind: AttributeKind::Required,
        force_new: true,
        description: "The environment the resource is registered in",
    },
    AttributeSchema {
        name: "service_endpoint_id",
        kind: AttributeKind::Required,
        force_new: true,
        description: "The Kubernetes service connection used to reach the cluster",
    },
    AttributeSchema {
        name: "name",
        kind: AttributeKind::Required,
        force_new: false,
        description: "Display name of the resource",
    },
    AttributeSchema {
        name: "namespace",
        kind: AttributeKind::Optional,
        force_new: true,
        description: "Kubernetes namespace targeted by deployments",
    },
    AttributeSchema {
        name: "cluster_name",
        kind: AttributeKind::Optional,
        force_new: true,
        description: "Name of the Kubernetes cluster",
    },
    AttributeSchema {
        name: "tags",
        kind: AttributeKind::Optional,
        force_new: false,
        description: "Set of tags attached to the resource",
    },
];

pub fn attribute(name: &str) -> Option<&'static AttributeSchema> {
    ATTRIBUTES.iter().find(|attr| attr.name == name)
}

pub fn is_force_new(name: &str) -> bool {
    attribute(name).is_some_and(|attr| attr.force_new)
}

/// Names of the configurable attributes whose desired value differs from
/// the prior state, in schema order.
pub fn diff(prior: &ResourceState, desired: &ResourceConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();

    if prior.project_id != desired.project_id {
        changed.push("project_id");
    }
    if prior.environment_id != desired.environment_id {
        changed.push("environment_id");
    }
    if prior.service_endpoint_id != desired.service_endpoint_id {
        changed.push("service_endpoint_id");
    }
    if prior.name != desired.name {
        changed.push("name");
    }
    if prior.namespace != desired.namespace {
        changed.push("namespace");
    }
    if prior.cluster_name != desired.cluster_name {
        changed.push("cluster_name");
    }
    if prior.tags != desired.normalized_tags() {
        changed.push("tags");
    }

    changed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Create,
    NoOp,
    UpdateInPlace { changed: Vec<&'static str> },
    Replace { reasons: Vec<&'static str> },
}

impl Plan {
    pub fn action(&self) -> &'static str {
        match self {
            Plan::Create => "create",
            Plan::NoOp => "no-op",
            Plan::UpdateInPlace { .. } => "update",
            Plan::Replace { .. } => "replace",
        }
    }
}

pub fn plan(prior: Option<&ResourceState>, desired: &ResourceConfig) -> Plan {
    let Some(prior) = prior else {
        return Plan::Create;
    };

    let changed = diff(prior, desired);
    if changed.is_empty() {
        return Plan::NoOp;
    }

    let reasons: Vec<&'static str> = changed
        .iter()
        .copied()
        .filter(|name| is_force_new(name))
        .collect();
    if reasons.is_empty() {
        Plan::UpdateInPlace { changed }
    } else {
        Plan::Replace { reasons }
    }
}
