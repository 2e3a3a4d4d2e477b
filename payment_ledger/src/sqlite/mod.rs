//! SQLite backend for the transaction ledger.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::{SqliteDatabase, SqliteGroupLock};
