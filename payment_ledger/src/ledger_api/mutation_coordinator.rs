//! Idempotent mutation coordination
//!
//! Every mutation follows the same protocol:
//! 1. Look the transaction id up. If a row exists and describes the same attempt, it is the answer and the gateway
//!    is not called again. If it describes a different attempt, the call fails with an idempotency conflict.
//! 2. Ask the gateway for a decision, bounded by a timeout. If no decision is obtained, nothing is written.
//! 3. Record the decision with a single conditional insert. If a concurrent caller won the race, their row is the
//!    canonical outcome and is returned instead.
//!
//! Approved and declined decisions are both recorded. A decline is final for its transaction id: a new attempt
//! must use a new id.
use std::{future::Future, time::Duration};

use log::*;

use crate::{
    db_types::{AttemptFingerprint, GatewayDecision, PendingTransaction, Transaction, TransactionId},
    ledger_api::errors::LedgerApiError,
    traits::{GatewayError, LedgerWriter},
};

/// The result of a coordinated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// The canonical row for the transaction id
    pub transaction: Transaction,
    /// True only for the one call whose insert created the row.
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MutationCoordinator {
    gateway_timeout: Duration,
}

impl MutationCoordinator {
    pub fn new(gateway_timeout: Duration) -> Self {
        Self { gateway_timeout }
    }

    pub fn gateway_timeout(&self) -> Duration {
        self.gateway_timeout
    }

    /// Returns the recorded outcome for `id`, if there is one and it matches `fingerprint`.
    pub async fn replay<W: LedgerWriter>(
        &self,
        writer: &mut W,
        id: &TransactionId,
        fingerprint: &AttemptFingerprint,
    ) -> Result<Option<Transaction>, LedgerApiError> {
        match writer.lookup(id).await? {
            Some(existing) if fingerprint.matches(&existing) => {
                debug!("🔄️ Transaction {id} has already been recorded ({}). Replaying it.", existing.status());
                Ok(Some(existing))
            },
            Some(existing) => {
                warn!(
                    "🔄️ Transaction id {id} was reused. Stored: {} in group {}. Requested: {} in group {}.",
                    existing.transaction_type, existing.group_id, fingerprint.transaction_type, fingerprint.group_id
                );
                Err(reuse_error(&existing, fingerprint))
            },
            None => Ok(None),
        }
    }

    /// Runs the full protocol for `pending`, obtaining the decision from `call_gateway`.
    ///
    /// `call_gateway` is invoked at most once, and only when no row for the id exists yet.
    pub async fn create_transaction<W, F, Fut>(
        &self,
        writer: &mut W,
        pending: PendingTransaction,
        call_gateway: F,
    ) -> Result<MutationOutcome, LedgerApiError>
    where
        W: LedgerWriter,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GatewayDecision, GatewayError>>,
    {
        let fingerprint = pending.fingerprint();
        if let Some(transaction) = self.replay(writer, &pending.id, &fingerprint).await? {
            return Ok(MutationOutcome { transaction, inserted: false });
        }
        let decision = self.decide(&pending.id, call_gateway).await?;
        let id = pending.id.clone();
        let gateway_reference = decision.gateway_reference.clone();
        let (transaction, inserted) = match writer.insert_if_absent(pending.with_decision(decision)).await {
            Ok(result) => result,
            Err(e) => {
                // The gateway has acted, so running the request again could move money twice
                error!(
                    "🔄️ The gateway decided {id} (reference {}), but the decision could not be recorded: {e}. This \
                     transaction must be reconciled by hand.",
                    gateway_reference.as_ref().map(|r| r.as_str()).unwrap_or("none")
                );
                return Err(LedgerApiError::OutcomeUnknown(e));
            },
        };
        if inserted {
            info!(
                "🔄️ Recorded {} {id} for {} in group {}: {}",
                transaction.transaction_type,
                transaction.amount,
                transaction.group_id,
                transaction.status()
            );
        } else if fingerprint.matches(&transaction) {
            debug!("🔄️ Lost the insert race for {id}. Returning the concurrent caller's outcome.");
        } else {
            warn!("🔄️ Transaction id {id} was claimed concurrently by a different request.");
            return Err(reuse_error(&transaction, &fingerprint));
        }
        Ok(MutationOutcome { transaction, inserted })
    }

    async fn decide<F, Fut>(&self, id: &TransactionId, call_gateway: F) -> Result<GatewayDecision, LedgerApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GatewayDecision, GatewayError>>,
    {
        match tokio::time::timeout(self.gateway_timeout, call_gateway()).await {
            Ok(Ok(decision)) => {
                trace!("🔄️ Gateway decision for {id}: {}", decision.result_code);
                Ok(decision)
            },
            Ok(Err(e)) => {
                warn!("🔄️ No gateway decision for {id}: {e}. Nothing was recorded.");
                Err(e.into())
            },
            Err(_) => {
                let e = GatewayError::Timeout(u64::try_from(self.gateway_timeout.as_millis()).unwrap_or(u64::MAX));
                warn!("🔄️ No gateway decision for {id}: {e}. Nothing was recorded.");
                Err(e.into())
            },
        }
    }
}

/// Another merchant's id must look like a missing resource, not a taken one.
fn reuse_error(existing: &Transaction, fingerprint: &AttemptFingerprint) -> LedgerApiError {
    if existing.merchant_id == fingerprint.merchant_id {
        LedgerApiError::IdempotencyConflict
    } else {
        LedgerApiError::NotFound
    }
}
