use azdo::{ClientError, ResourceRef};
use thiserror::Error;

/// Input problems detected before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required attribute `{field}` is missing or empty")]
    MissingField { field: &'static str },

    #[error("Attribute `{field}` is invalid: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("Attribute `{field}` cannot be changed in place; the resource must be replaced")]
    ImmutableField { field: &'static str },

    #[error("Invalid import ID {id:?}: expected <project>/<environment_id>/<resource_id>")]
    InvalidImportId { id: String },
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote error: {0}")]
    Remote(#[from] ClientError),

    #[error("Resource {resource} does not exist")]
    NotFound { resource: ResourceRef },
}

impl ReconcileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
