use thiserror::Error;

use crate::{
    db_types::{GroupId, NewTransaction, Transaction, TransactionId},
    ledger_api::transaction_objects::TransactionQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum LedgerStoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("A stored row could not be decoded: {0}")]
    InvalidRow(String),
    #[error("The insert for {0} was a no-op, but no existing row could be found")]
    MissingAfterConflict(TransactionId),
    #[error("Group {0} was modified by another writer while it was locked")]
    ConcurrentModification(GroupId),
    #[error("Group {0} is claimed by another ledger instance")]
    GroupBusy(GroupId),
    #[error("Transaction {transaction_id} cannot be written through the lock on group {locked}")]
    WrongGroup { transaction_id: TransactionId, locked: GroupId },
}

impl From<sqlx::Error> for LedgerStoreError {
    fn from(e: sqlx::Error) -> Self {
        LedgerStoreError::DatabaseError(e.to_string())
    }
}

/// The write half of the ledger: a keyed lookup and the conditional insert.
///
/// Both the store itself and a [`GroupLock`] handle implement this, so the mutation coordinator can persist an
/// outcome either directly (for root transactions) or inside a group's critical section.
#[allow(async_fn_in_trait)]
pub trait LedgerWriter {
    /// Fetches the transaction with the given id, if it has been recorded.
    async fn lookup(&mut self, id: &TransactionId) -> Result<Option<Transaction>, LedgerStoreError>;

    /// Inserts the transaction if no row with the same id exists. This call must be atomic.
    ///
    /// Returns the canonical stored row and `true` if this call created it, or the pre-existing row and `false` if
    /// the insert was a no-op.
    async fn insert_if_absent(&mut self, transaction: NewTransaction) -> Result<(Transaction, bool), LedgerStoreError>;
}

/// An exclusive, scoped lock over one transaction group.
///
/// While the handle is alive no other caller can acquire a lock on the same group, and reads and writes made through
/// the handle happen inside the lock. A write is durable once `insert_if_absent` returns. Dropping the handle frees
/// the lock just as [`GroupLock::release`] does.
#[allow(async_fn_in_trait)]
pub trait GroupLock: LedgerWriter {
    fn group_id(&self) -> &GroupId;

    /// All transactions in the locked group, in creation order.
    async fn transactions(&mut self) -> Result<Vec<Transaction>, LedgerStoreError>;

    /// Releases the lock.
    async fn release(self) -> Result<(), LedgerStoreError>;
}

/// The storage contract for the transaction ledger.
///
/// Rows are append-only: no method on this trait updates or deletes a transaction.
#[allow(async_fn_in_trait)]
pub trait LedgerStore: Clone + LedgerWriter {
    type Lock: GroupLock;

    /// The URL of the database
    fn url(&self) -> &str;

    /// Acquires the exclusive lock for `group_id`, waiting for any current holder to release it.
    ///
    /// Locking a group that does not exist succeeds; the handle simply reports no transactions.
    async fn lock_group(&self, group_id: &GroupId) -> Result<Self::Lock, LedgerStoreError>;

    /// All transactions in the group, in creation order. If the group does not exist, the result is empty.
    async fn list_transactions(&self, group_id: &GroupId) -> Result<Vec<Transaction>, LedgerStoreError>;

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, LedgerStoreError>;

    /// Fetches transactions matching every criterion in the filter, in creation order.
    async fn search_transactions(&self, filter: TransactionQueryFilter) -> Result<Vec<Transaction>, LedgerStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerStoreError> {
        Ok(())
    }
}
