#![allow(dead_code)]
use log::*;
use payment_ledger::{
    authorization::{ActorType, SCOPE_TRANSACTIONS_READ, SCOPE_TRANSACTIONS_WRITE},
    db_types::Amount,
    events::EventProducers,
    test_utils::{prepare_env::fresh_database, MockGateway},
    AuthClaims,
    AuthContext,
    LedgerQueryApi,
    LedgerStore,
    SqliteDatabase,
    TransactionFlowApi,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub struct TestLedger {
    pub flow: TransactionFlowApi<SqliteDatabase, MockGateway>,
    pub query: LedgerQueryApi<SqliteDatabase>,
    pub gateway: MockGateway,
}

pub async fn setup() -> TestLedger {
    setup_with_producers(EventProducers::default()).await
}

pub async fn setup_with_producers(producers: EventProducers) -> TestLedger {
    let db = fresh_database(5).await;
    let gateway = MockGateway::new();
    let flow = TransactionFlowApi::new(db.clone(), gateway.clone(), producers);
    let query = LedgerQueryApi::new(db);
    TestLedger { flow, query, gateway }
}

pub async fn tear_down(mut ledger: TestLedger) {
    let url = ledger.flow.db().url().to_string();
    if let Err(e) = ledger.flow.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Could not remove {url}: {e}");
    }
}

pub fn dollars(value: i64) -> Amount {
    Amount::from_major_units(value)
}

const ALL_SCOPES: [&str; 2] = [SCOPE_TRANSACTIONS_READ, SCOPE_TRANSACTIONS_WRITE];

pub fn merchant(ids: &[&str]) -> AuthContext {
    let claims = AuthClaims::new(ActorType::Merchant, "merchant-user").with_merchant_ids(ids).with_scopes(&ALL_SCOPES);
    AuthContext::new(claims).expect("valid merchant claims")
}

pub fn service(allow_list: &[&str]) -> AuthContext {
    let claims =
        AuthClaims::new(ActorType::Service, "checkout-service").with_merchant_ids(allow_list).with_scopes(&ALL_SCOPES);
    AuthContext::new(claims).expect("valid service claims")
}

pub fn admin() -> AuthContext {
    AuthContext::new(AuthClaims::new(ActorType::Admin, "ops")).expect("valid admin claims")
}

pub fn customer(customer_id: &str) -> AuthContext {
    let claims = AuthClaims::new(ActorType::Customer, format!("user-{customer_id}"))
        .with_customer_id(customer_id)
        .with_scopes(&ALL_SCOPES);
    AuthContext::new(claims).expect("valid customer claims")
}

pub fn guest(session_id: &str) -> AuthContext {
    let claims = AuthClaims::new(ActorType::Guest, format!("guest-{session_id}"))
        .with_session_id(session_id)
        .with_scopes(&[SCOPE_TRANSACTIONS_READ]);
    AuthContext::new(claims).expect("valid guest claims")
}
