use chrono::{DateTime, SecondsFormat, Utc};
use log::*;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use super::groups;
use crate::{
    db_types::{
        Amount,
        Currency,
        CustomerId,
        GatewayReference,
        GroupId,
        MerchantId,
        NewTransaction,
        Transaction,
        TransactionId,
        TransactionMetadata,
        TransactionType,
    },
    ledger_api::transaction_objects::TransactionQueryFilter,
    traits::LedgerStoreError,
};

/// The raw shape of a row in the `transactions` table.
#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    group_id: String,
    merchant_id: String,
    customer_id: Option<String>,
    transaction_type: String,
    amount: i64,
    currency: String,
    gateway_reference: Option<String>,
    gateway_result_code: String,
    metadata: String,
    created_at: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = LedgerStoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            LedgerStoreError::InvalidRow(format!("{what} of transaction {} is invalid: {e}", row.id))
        };
        let transaction_type =
            row.transaction_type.parse::<TransactionType>().map_err(|e| invalid("transaction_type", &e))?;
        let metadata =
            serde_json::from_str::<TransactionMetadata>(&row.metadata).map_err(|e| invalid("metadata", &e))?;
        if metadata.transaction_type() != transaction_type {
            return Err(invalid("metadata", &"does not match the transaction type"));
        }
        let currency = Currency::new(&row.currency).map_err(|e| invalid("currency", &e))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| invalid("created_at", &e))?
            .with_timezone(&Utc);
        Ok(Transaction {
            id: TransactionId::from(row.id),
            group_id: GroupId::from(row.group_id),
            merchant_id: MerchantId::from(row.merchant_id),
            customer_id: row.customer_id.map(CustomerId::from),
            transaction_type,
            amount: Amount::from_minor_units(row.amount),
            currency,
            gateway_reference: row.gateway_reference.map(GatewayReference::from),
            gateway_result_code: row.gateway_result_code,
            metadata,
            created_at,
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text, so that string comparison matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_all(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>, LedgerStoreError> {
    rows.into_iter().map(Transaction::try_from).collect()
}

/// Inserts the transaction unless a row with the same id already exists. This is a single conditional statement, so
/// exactly one of any number of concurrent callers can create the row.
///
/// Returns the row and `true` if this call created it, or the pre-existing row and `false`. Root transactions also
/// create their group's anchor row. Embed the call in a database transaction to make both writes atomic.
pub async fn insert_if_absent(
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<(Transaction, bool), LedgerStoreError> {
    let metadata = serde_json::to_string(&transaction.metadata)
        .map_err(|e| LedgerStoreError::InvalidRow(format!("metadata of {} cannot be encoded: {e}", transaction.id)))?;
    let transaction_type = transaction.transaction_type();
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                id,
                group_id,
                merchant_id,
                customer_id,
                transaction_type,
                amount,
                currency,
                gateway_reference,
                gateway_result_code,
                metadata,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT(id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(transaction.id.as_str())
    .bind(transaction.group_id.as_str())
    .bind(transaction.merchant_id.as_str())
    .bind(transaction.customer_id.as_ref().map(|c| c.as_str()))
    .bind(transaction_type.to_string())
    .bind(transaction.amount.value())
    .bind(transaction.currency.as_str())
    .bind(transaction.gateway_reference.as_ref().map(|r| r.as_str()))
    .bind(transaction.gateway_result_code.as_str())
    .bind(metadata)
    .bind(format_timestamp(&Utc::now()))
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            let stored = Transaction::try_from(row)?;
            if transaction_type.is_root() {
                groups::create_anchor(&stored.group_id, &stored.merchant_id, conn).await?;
            }
            debug!("🗃️ Transaction {} ({transaction_type}) inserted into group {}", stored.id, stored.group_id);
            Ok((stored, true))
        },
        None => {
            let existing = fetch_transaction(&transaction.id, conn)
                .await?
                .ok_or_else(|| LedgerStoreError::MissingAfterConflict(transaction.id.clone()))?;
            debug!("🗃️ Transaction {} already exists. Insert was a no-op.", existing.id);
            Ok((existing, false))
        },
    }
}

pub async fn fetch_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerStoreError> {
    let row: Option<TransactionRow> =
        sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    row.map(Transaction::try_from).transpose()
}

/// Every transaction in the group, in creation order.
pub async fn fetch_group(group_id: &GroupId, conn: &mut SqliteConnection) -> Result<Vec<Transaction>, LedgerStoreError> {
    let rows: Vec<TransactionRow> = sqlx::query_as("SELECT * FROM transactions WHERE group_id = $1 ORDER BY rowid ASC")
        .bind(group_id.as_str())
        .fetch_all(conn)
        .await?;
    trace!("🗃️ Fetched {} transactions for group {group_id}", rows.len());
    decode_all(rows)
}

/// Fetches transactions according to the criteria in the `TransactionQueryFilter`, in creation order.
pub async fn search_transactions(
    filter: TransactionQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, LedgerStoreError> {
    if filter.matches_nothing() {
        trace!("🗃️ Filter matches nothing. Skipping the query.");
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM transactions ");
    if !filter.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(merchant_ids) = filter.merchant_ids {
        where_clause.push("merchant_id IN (");
        for (i, merchant_id) in merchant_ids.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(merchant_id.to_string());
        }
        where_clause.push_unseparated(")");
    }
    if let Some(customer_id) = filter.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id.to_string());
    }
    if let Some(group_id) = filter.group_id {
        where_clause.push("group_id = ");
        where_clause.push_bind_unseparated(group_id.to_string());
    }
    if let Some(types) = filter.transaction_types {
        where_clause.push("transaction_type IN (");
        for (i, transaction_type) in types.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(transaction_type.to_string());
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = filter.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(format_timestamp(&since));
    }
    if let Some(until) = filter.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(format_timestamp(&until));
    }
    builder.push(" ORDER BY rowid ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<TransactionRow>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_transactions: {} rows", rows.len());
    decode_all(rows)
}
