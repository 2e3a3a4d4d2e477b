use std::collections::HashMap;

use cucumber::World;
use log::*;
use payment_ledger::{
    db_types::GroupId,
    events::EventProducers,
    test_utils::{
        prepare_env::{create_database, random_db_path, run_migrations},
        MockGateway,
    },
    transaction_objects::OperationResponse,
    LedgerApiError,
    LedgerQueryApi,
    SqliteDatabase,
    TransactionFlowApi,
};

#[derive(Default, Debug, World)]
pub struct LedgerWorld {
    pub system: Option<LedgerSystem>,
    /// Group ids, keyed by the id of the transaction that opened the group
    pub groups: HashMap<String, GroupId>,
    pub last_result: Option<Result<OperationResponse, LedgerApiError>>,
}

impl LedgerWorld {
    pub fn system(&self) -> &LedgerSystem {
        self.system.as_ref().expect("Ledger not initialised")
    }

    pub fn group_of(&self, root_id: &str) -> GroupId {
        self.groups.get(root_id).cloned().unwrap_or_else(|| GroupId::from(format!("grp_unknown_{root_id}")))
    }

    /// Remembers the outcome of the latest operation, and the group it opened if it was a root.
    pub fn record(&mut self, root_id: Option<&str>, result: Result<OperationResponse, LedgerApiError>) {
        match (&result, root_id) {
            (Ok(response), Some(id)) => {
                self.groups.insert(id.to_string(), response.group_id.clone());
            },
            (Err(e), _) => debug!("🚀️ Operation failed: {e}"),
            _ => {},
        }
        self.last_result = Some(result);
    }

    pub fn last_result(&self) -> &Result<OperationResponse, LedgerApiError> {
        self.last_result.as_ref().expect("No operation has been performed yet")
    }
}

#[derive(Debug)]
pub struct LedgerSystem {
    pub db_path: String,
    pub flow: TransactionFlowApi<SqliteDatabase, MockGateway>,
    pub query: LedgerQueryApi<SqliteDatabase>,
    pub gateway: MockGateway,
}

impl LedgerSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let gateway = MockGateway::new();
        let flow = TransactionFlowApi::new(db.clone(), gateway.clone(), EventProducers::default());
        let query = LedgerQueryApi::new(db);
        Self { db_path: url, flow, query, gateway }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
