use crate::db::store::StoreError;
use crate::directory::DirectoryError;

/// Malformed input. Raised before any transaction opens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} has an invalid format: {value}")]
    InvalidFormat { field: &'static str, value: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("attribute {0} cannot be changed through the desk")]
    AttributeNotAllowed(String),

    #[error("built-in group {0} cannot be targeted")]
    BuiltInGroup(String),

    #[error("company {0} does not exist or is inactive")]
    UnknownCompany(i32),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request stays Pending; calling approve again may succeed.
    #[error("directory action for {request_number} failed: {source}")]
    DirectoryActionFailed {
        request_number: String,
        #[source]
        source: DirectoryError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LifecycleError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::DirectoryActionFailed { .. })
    }
}
