//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open an atomic transaction as the need arises, and call
//! through to the functions without any other changes.
use std::{env, str::FromStr, time::Duration};

use log::*;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

use crate::config::DEFAULT_DATABASE_URL;

pub mod groups;
pub mod transactions;

pub fn db_url() -> String {
    let result = env::var("LEDGER_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ LEDGER_DATABASE_URL is not set. Using the default.");
        DEFAULT_DATABASE_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(
    url: &str,
    max_connections: u32,
    busy_timeout: Duration,
    create_if_missing: bool,
) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(create_if_missing)
        .busy_timeout(busy_timeout)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
