use std::fmt::Display;

use thiserror::Error;

use crate::db_types::{Amount, Currency, GatewayDecision, GatewayReference, TransactionId, TransactionType};

/// The operation the gateway is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    Authorize,
    Sale,
    Capture,
    Void,
    Refund,
    PreNote,
}

impl From<TransactionType> for GatewayOperation {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::Auth => GatewayOperation::Authorize,
            TransactionType::Sale => GatewayOperation::Sale,
            TransactionType::Capture => GatewayOperation::Capture,
            TransactionType::Void => GatewayOperation::Void,
            TransactionType::Refund => GatewayOperation::Refund,
            TransactionType::PreNote => GatewayOperation::PreNote,
        }
    }
}

impl Display for GatewayOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayOperation::Authorize => "authorize",
            GatewayOperation::Sale => "sale",
            GatewayOperation::Capture => "capture",
            GatewayOperation::Void => "void",
            GatewayOperation::Refund => "refund",
            GatewayOperation::PreNote => "pre_note",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub operation: GatewayOperation,
    pub amount: Amount,
    pub currency: Currency,
    /// The reference of the prior operation this one chains from. Required for capture, void and refund.
    pub operation_reference: Option<GatewayReference>,
    /// Passed through so gateways that support their own idempotency keys can deduplicate as well.
    pub transaction_id: TransactionId,
}

/// A gateway call that did not produce a decision. Nothing may be recorded for such a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("The payment gateway could not be reached: {0}")]
    Unavailable(String),
    #[error("The payment gateway did not respond within {0} ms")]
    Timeout(u64),
}

/// Adapter for the external payment gateway.
///
/// Implementations must return `Ok` for every call where the gateway made a decision, including declines, and `Err`
/// only when no decision was obtained.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn process(&self, request: GatewayRequest) -> Result<GatewayDecision, GatewayError>;
}
