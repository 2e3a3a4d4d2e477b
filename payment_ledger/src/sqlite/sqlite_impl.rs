//! `SqliteDatabase` is the SQLite implementation of the ledger store.
//!
//! Group locks are an in-process keyed mutex, so callers on different groups never wait for each other. The lock does
//! not pin a connection or hold an open database transaction: SQLite has a single writer per database, and holding
//! its write lock across a gateway call would stall every other group.
//!
//! Other processes are kept out by a claim on the group's anchor row. Each `SqliteDatabase` has its own owner token,
//! and `lock_group` writes it into the anchor, with an expiry, before any state is read. A live claim by another
//! owner makes `lock_group` wait, and eventually fail with nothing done. The insert made under the lock re-checks the
//! claim and bumps `lock_version` in the same database transaction, and the claim is cleared on release.
use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;
use tokio::time::Instant;

use super::db::{db_url, groups, new_pool, transactions};
use crate::{
    config::LedgerConfig,
    db_types::{GroupId, NewTransaction, Transaction, TransactionId},
    helpers::{KeyedLockGuard, KeyedLocks},
    ledger_api::transaction_objects::TransactionQueryFilter,
    traits::{GroupLock, LedgerStore, LedgerStoreError, LedgerWriter},
};

const CLAIM_RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    locks: KeyedLocks,
    /// Identifies this instance (and its clones) in group claims
    owner: String,
    group_lease: Duration,
    lock_wait: Duration,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let config = LedgerConfig::new(url).with_max_connections(max_connections);
        SqliteDatabase::new_with_config(&config).await
    }

    pub async fn new_with_config(config: &LedgerConfig) -> Result<Self, sqlx::Error> {
        let pool = new_pool(
            config.database_url.as_str(),
            config.max_connections,
            config.busy_timeout,
            config.create_if_missing,
        )
        .await?;
        let owner = format!("{:016x}", rand::random::<u64>());
        debug!(
            "🗃️ Connected to {} with up to {} connections. Claiming groups as {owner}.",
            config.database_url, config.max_connections
        );
        Ok(Self {
            url: config.database_url.clone(),
            pool,
            locks: KeyedLocks::new(),
            owner,
            group_lease: config.group_lease,
            lock_wait: config.lock_wait,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The token this instance writes into the groups it claims.
    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Claims an existing group, waiting up to `lock_wait` for another owner's claim to be released or to lapse.
    ///
    /// Returns the group's `lock_version` once claimed, or `None` if the group does not exist.
    async fn claim_group(&self, group_id: &GroupId) -> Result<Option<i64>, LedgerStoreError> {
        let lease = i64::try_from(self.group_lease.as_millis()).unwrap_or(i64::MAX);
        let deadline = Instant::now() + self.lock_wait;
        let mut conn = self.pool.acquire().await?;
        loop {
            let now = Utc::now().timestamp_millis();
            let claimed = groups::claim(group_id, &self.owner, now, now.saturating_add(lease), &mut conn).await?;
            let version = groups::lock_version(group_id, &mut conn).await?;
            match (claimed, version) {
                (_, None) => return Ok(None),
                (true, Some(v)) => return Ok(Some(v)),
                (false, Some(_)) if Instant::now() >= deadline => {
                    warn!("🗃️ Gave up waiting for group {group_id}, which is claimed by another instance");
                    return Err(LedgerStoreError::GroupBusy(group_id.clone()));
                },
                (false, Some(_)) => {
                    trace!("🗃️ Group {group_id} is claimed by another instance. Waiting.");
                    tokio::time::sleep(CLAIM_RETRY_INTERVAL).await;
                },
            }
        }
    }
}

impl LedgerWriter for SqliteDatabase {
    async fn lookup(&mut self, id: &TransactionId) -> Result<Option<Transaction>, LedgerStoreError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(id, &mut conn).await
    }

    async fn insert_if_absent(&mut self, transaction: NewTransaction) -> Result<(Transaction, bool), LedgerStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = transactions::insert_if_absent(transaction, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }
}

impl LedgerStore for SqliteDatabase {
    type Lock = SqliteGroupLock;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn lock_group(&self, group_id: &GroupId) -> Result<Self::Lock, LedgerStoreError> {
        let guard = self.locks.acquire(group_id.as_str()).await;
        let version = self.claim_group(group_id).await?;
        if version.is_none() {
            trace!("🗃️ Locked group {group_id}, which does not exist (yet)");
        }
        Ok(SqliteGroupLock {
            group_id: group_id.clone(),
            version,
            owner: self.owner.clone(),
            pool: self.pool.clone(),
            guard: Some(guard),
        })
    }

    async fn list_transactions(&self, group_id: &GroupId) -> Result<Vec<Transaction>, LedgerStoreError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_group(group_id, &mut conn).await
    }

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, LedgerStoreError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(id, &mut conn).await
    }

    async fn search_transactions(&self, filter: TransactionQueryFilter) -> Result<Vec<Transaction>, LedgerStoreError> {
        let mut conn = self.pool.acquire().await?;
        debug!("🗃️ Searching transactions. {filter}");
        transactions::search_transactions(filter, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

/// A held lock on one group.
///
/// Dropping the lock without calling [`GroupLock::release`] clears the claim in the background, and keeps other
/// callers in this process out until that is done.
pub struct SqliteGroupLock {
    group_id: GroupId,
    /// The group's `lock_version` as last seen by this holder. `None` if the group does not exist, in which case
    /// nothing was claimed.
    version: Option<i64>,
    owner: String,
    pool: SqlitePool,
    guard: Option<KeyedLockGuard>,
}

impl Debug for SqliteGroupLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteGroupLock({})", self.group_id)
    }
}

impl LedgerWriter for SqliteGroupLock {
    async fn lookup(&mut self, id: &TransactionId) -> Result<Option<Transaction>, LedgerStoreError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(id, &mut conn).await
    }

    async fn insert_if_absent(&mut self, transaction: NewTransaction) -> Result<(Transaction, bool), LedgerStoreError> {
        if transaction.group_id != self.group_id {
            return Err(LedgerStoreError::WrongGroup {
                transaction_id: transaction.id,
                locked: self.group_id.clone(),
            });
        }
        let version = self.version.ok_or_else(|| LedgerStoreError::ConcurrentModification(self.group_id.clone()))?;
        let mut tx = self.pool.begin().await?;
        // First statement of the transaction, so the write lock is taken before anything is read
        if !groups::bump_lock_version(&self.group_id, &self.owner, version, &mut tx).await? {
            warn!("🗃️ The claim on group {} was lost while it was locked. Rolling back.", self.group_id);
            return Err(LedgerStoreError::ConcurrentModification(self.group_id.clone()));
        }
        let (stored, inserted) = transactions::insert_if_absent(transaction, &mut tx).await?;
        if inserted {
            tx.commit().await?;
            self.version = Some(version + 1);
        } else {
            tx.rollback().await?;
        }
        Ok((stored, inserted))
    }
}

impl GroupLock for SqliteGroupLock {
    fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    async fn transactions(&mut self) -> Result<Vec<Transaction>, LedgerStoreError> {
        if self.version.is_none() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_group(&self.group_id, &mut conn).await
    }

    async fn release(mut self) -> Result<(), LedgerStoreError> {
        trace!("🗃️ Releasing lock on group {}", self.group_id);
        if self.version.take().is_some() {
            let mut conn = self.pool.acquire().await?;
            groups::release_claim(&self.group_id, &self.owner, &mut conn).await?;
        }
        Ok(())
    }
}

impl Drop for SqliteGroupLock {
    fn drop(&mut self) {
        if self.version.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("🗃️ No runtime to release group {}. The claim will lapse on its own.", self.group_id);
            return;
        };
        let group_id = self.group_id.clone();
        let owner = self.owner.clone();
        let pool = self.pool.clone();
        let guard = self.guard.take();
        handle.spawn(async move {
            let result = match pool.acquire().await {
                Ok(mut conn) => groups::release_claim(&group_id, &owner, &mut conn).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                warn!("🗃️ Could not release group {group_id}: {e}. The claim will lapse on its own.");
            }
            drop(guard);
        });
    }
}
