use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// Deliberately carries no detail: it must look identical whether the resource is missing or merely hidden.
    #[error("The requested resource does not exist")]
    NotFound,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("A merchant id is required for this request")]
    MissingMerchantId,
    #[error("Invalid authentication context: {0}")]
    InvalidContext(String),
}
