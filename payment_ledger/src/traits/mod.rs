//! # Collaborator contracts
//!
//! The ledger core talks to two external collaborators, and this module defines what it needs from each.
//!
//! * [`LedgerStore`] is the append-only transaction table. It supplies the atomic conditional insert
//!   ([`LedgerWriter::insert_if_absent`]) that makes retries safe, and the per-group exclusive lock ([`GroupLock`])
//!   that makes "recompute state, validate, insert" a single critical section.
//! * [`PaymentGateway`] is the adapter that actually talks to the payment network. The only thing the core cares
//!   about is whether a call produced a *decision* (approved or declined) or not.
mod ledger_store;
mod payment_gateway;

pub use ledger_store::{GroupLock, LedgerStore, LedgerStoreError, LedgerWriter};
pub use payment_gateway::{GatewayError, GatewayOperation, GatewayRequest, PaymentGateway};
