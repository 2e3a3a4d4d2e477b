use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{GroupId, MerchantId},
    traits::LedgerStoreError,
};

/// Creates the anchor row for a new group. A no-op if the group already has one.
pub async fn create_anchor(
    group_id: &GroupId,
    merchant_id: &MerchantId,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerStoreError> {
    let result = sqlx::query(
        "INSERT INTO transaction_groups (group_id, merchant_id) VALUES ($1, $2) ON CONFLICT(group_id) DO NOTHING",
    )
    .bind(group_id.as_str())
    .bind(merchant_id.as_str())
    .execute(conn)
    .await?;
    if result.rows_affected() > 0 {
        trace!("🗃️ Created anchor for group {group_id}");
    }
    Ok(())
}

pub async fn lock_version(group_id: &GroupId, conn: &mut SqliteConnection) -> Result<Option<i64>, LedgerStoreError> {
    let version: Option<(i64,)> = sqlx::query_as("SELECT lock_version FROM transaction_groups WHERE group_id = $1")
        .bind(group_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(version.map(|(v,)| v))
}

/// Claims the group for `owner` until `expires_at` (unix milliseconds).
///
/// Succeeds if the group is unclaimed, already claimed by `owner`, or its last claim has lapsed. Returns `false` if
/// another owner holds a live claim, or if the group does not exist.
pub async fn claim(
    group_id: &GroupId,
    owner: &str,
    now: i64,
    expires_at: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerStoreError> {
    let result = sqlx::query(
        "UPDATE transaction_groups SET lock_owner = $1, lock_expires_at = $2 WHERE group_id = $3 AND (lock_owner IS \
         NULL OR lock_owner = $1 OR lock_expires_at <= $4)",
    )
    .bind(owner)
    .bind(expires_at)
    .bind(group_id.as_str())
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Gives up `owner`'s claim on the group. A no-op if somebody else holds it.
pub async fn release_claim(
    group_id: &GroupId,
    owner: &str,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerStoreError> {
    let result = sqlx::query(
        "UPDATE transaction_groups SET lock_owner = NULL, lock_expires_at = NULL WHERE group_id = $1 AND lock_owner = \
         $2",
    )
    .bind(group_id.as_str())
    .bind(owner)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        warn!("🗃️ The claim on group {group_id} had already passed to another owner");
    }
    Ok(())
}

/// Advances the group's `lock_version` if `owner` still holds the claim and the version still equals `expected`.
/// Returns `false` if the claim was lost or some other writer moved the version.
///
/// Run this as the first statement of a database transaction, so that the transaction holds SQLite's write lock from
/// the start and never works from a stale snapshot.
pub async fn bump_lock_version(
    group_id: &GroupId,
    owner: &str,
    expected: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerStoreError> {
    let result = sqlx::query(
        "UPDATE transaction_groups SET lock_version = lock_version + 1, updated_at = CURRENT_TIMESTAMP WHERE group_id \
         = $1 AND lock_owner = $2 AND lock_version = $3",
    )
    .bind(group_id.as_str())
    .bind(owner)
    .bind(expected)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
