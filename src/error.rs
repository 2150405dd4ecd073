// Error taxonomy for the access layer.
//
// Absence on lookups is not an error: `get_*` operations return `Option`.
// `NotFound` only appears when a mutation targets a record that is gone.

use crate::consistency::DanglingReference;
use crate::roles::Role;
use crate::store::StoreError;
use thiserror::Error;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// ACCESS ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum AccessError {
    /// Store unreachable or query failed. Retryable.
    #[error("could not reach the data store: {0}")]
    Fetch(String),

    #[error("permission denied: {role} may not {action}")]
    PermissionDenied { role: Role, action: &'static str },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("dangling branch reference(s): {}", join(.0))]
    DanglingReference(Vec<DanglingReference>),

    #[error("invalid record: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

pub type AccessResult<T> = Result<T, AccessError>;

impl AccessError {
    /// Fetch failures are the only ones worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::Fetch(_))
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        AccessError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        AccessError::Fetch(err.to_string())
    }
}

impl From<Vec<ValidationError>> for AccessError {
    fn from(errors: Vec<ValidationError>) -> Self {
        AccessError::Invalid(errors)
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
