//! Payment Ledger
//!
//! The payment ledger is the transaction-group core of a multi-tenant card/ACH payment backend. It records every
//! authorization, sale, capture, void and refund as an immutable row, groups the rows of one funding lifecycle under
//! a shared group id, and derives each group's state from those rows on demand.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@traits`] and [`mod@sqlite`]). Backends implement [`LedgerStore`]; SQLite is the supported one.
//!    The data types used in the ledger live in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@ledger_api`]). [`TransactionFlowApi`] performs the mutating operations, each of which is
//!    idempotent on its caller-supplied transaction id, and [`LedgerQueryApi`] serves reads.
//! 3. Authorization ([`mod@authorization`]). Every API call takes an [`AuthContext`] that decides which merchant a
//!    mutation is charged to and which rows a caller may see.
//!
//! The ledger also emits events ([`mod@events`]) when transactions are recorded and when groups close, which you can
//! hook into to perform custom actions.
pub mod authorization;
pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use authorization::{AuthClaims, AuthContext, AuthorizationError};
pub use config::LedgerConfig;
pub use ledger_api::{
    errors::LedgerApiError,
    transaction_objects,
    GroupState,
    GroupStatus,
    LedgerQueryApi,
    MutationCoordinator,
    TransactionFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{GroupLock, LedgerStore, LedgerStoreError, LedgerWriter, PaymentGateway};
