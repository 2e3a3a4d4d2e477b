//! The ledger's public API.
//!
//! [`TransactionFlowApi`] performs the mutating operations and [`LedgerQueryApi`] the reads. Both are generic over
//! the storage backend ([`crate::traits::LedgerStore`]); the flow API is also generic over the payment gateway
//! adapter ([`crate::traits::PaymentGateway`]).
pub mod errors;
pub mod group_state;
pub mod ledger_query_api;
pub mod mutation_coordinator;
pub mod transaction_flow_api;
pub mod transaction_objects;

pub use errors::LedgerApiError;
pub use group_state::{CaptureEntry, FollowOnOperation, GroupRoot, GroupState, GroupStatus};
pub use ledger_query_api::LedgerQueryApi;
pub use mutation_coordinator::{MutationCoordinator, MutationOutcome};
pub use transaction_flow_api::TransactionFlowApi;
