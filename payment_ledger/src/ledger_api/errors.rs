use thiserror::Error;

use crate::{
    authorization::AuthorizationError,
    traits::{GatewayError, LedgerStoreError},
};

/// Every failure a ledger handler can report.
///
/// Each variant renders one stable message. Details that could leak another tenant's data, or the ledger's
/// internals, go to the log and never into the message.
#[derive(Debug, Clone, Error)]
pub enum LedgerApiError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("The requested resource does not exist")]
    NotFound,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("The payment gateway is unavailable. The request may be retried with the same transaction id.")]
    GatewayUnavailable,
    #[error("The operation is not allowed in the group's current state: {0}")]
    StateConflict(String),
    #[error("The transaction id has already been used for a different request")]
    IdempotencyConflict,
    #[error("The ledger could not complete the request. It may be retried with the same transaction id.")]
    Storage(#[source] LedgerStoreError),
    #[error(
        "The payment gateway processed the request, but the ledger could not record the outcome. Do not retry; the \
         transaction needs to be reconciled."
    )]
    OutcomeUnknown(#[source] LedgerStoreError),
}

impl LedgerApiError {
    /// A machine-readable code for the error class.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerApiError::Validation(_) => "validation_error",
            LedgerApiError::NotFound => "not_found",
            LedgerApiError::PermissionDenied(_) => "permission_denied",
            LedgerApiError::GatewayUnavailable => "gateway_unavailable",
            LedgerApiError::StateConflict(_) => "state_conflict",
            LedgerApiError::IdempotencyConflict => "idempotency_conflict",
            LedgerApiError::Storage(_) => "storage_error",
            LedgerApiError::OutcomeUnknown(_) => "outcome_unknown",
        }
    }

    /// Whether repeating the identical request could succeed. Neither the ledger nor the gateway acted for these
    /// errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerApiError::GatewayUnavailable | LedgerApiError::Storage(_))
    }
}

impl From<AuthorizationError> for LedgerApiError {
    fn from(e: AuthorizationError) -> Self {
        match e {
            AuthorizationError::NotFound => LedgerApiError::NotFound,
            AuthorizationError::PermissionDenied(s) => LedgerApiError::PermissionDenied(s),
            AuthorizationError::MissingMerchantId => {
                LedgerApiError::Validation("a merchant id is required for this request".into())
            },
            AuthorizationError::InvalidContext(s) => LedgerApiError::PermissionDenied(s),
        }
    }
}

impl From<LedgerStoreError> for LedgerApiError {
    fn from(e: LedgerStoreError) -> Self {
        LedgerApiError::Storage(e)
    }
}

impl From<GatewayError> for LedgerApiError {
    fn from(_: GatewayError) -> Self {
        LedgerApiError::GatewayUnavailable
    }
}
