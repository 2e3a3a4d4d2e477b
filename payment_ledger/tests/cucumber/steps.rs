use std::time::Duration;

use cucumber::{given, then, when};
use payment_ledger::{
    authorization::{ActorType, SCOPE_TRANSACTIONS_READ, SCOPE_TRANSACTIONS_WRITE},
    db_types::{Amount, MerchantId, TransactionId, TransactionStatus, VoidTarget},
    test_utils::MockResponse,
    transaction_objects::{AuthorizeRequest, CaptureRequest, RefundRequest, SaleRequest, VoidRequest},
    AuthClaims,
    AuthContext,
    LedgerStore,
};

use crate::cucumber::LedgerWorld;

fn merchant_ctx(merchant_id: &str) -> AuthContext {
    let claims = AuthClaims::new(ActorType::Merchant, format!("{merchant_id}-staff"))
        .with_merchant_ids(&[merchant_id])
        .with_scopes(&[SCOPE_TRANSACTIONS_READ, SCOPE_TRANSACTIONS_WRITE]);
    AuthContext::new(claims).expect("Invalid merchant claims")
}

fn usd(value: i64) -> Amount {
    Amount::from_major_units(value)
}

#[given(expr = "the gateway declines the next call with code {word}")]
async fn gateway_declines(world: &mut LedgerWorld, code: String) {
    world.system().gateway.push(MockResponse::Decline(code));
}

#[given("the gateway is unavailable for the next call")]
async fn gateway_unavailable(world: &mut LedgerWorld) {
    world.system().gateway.push(MockResponse::Unavailable);
}

#[given(expr = "the gateway takes {int}ms to answer the next call")]
async fn gateway_delays(world: &mut LedgerWorld, ms: u64) {
    world.system().gateway.push(MockResponse::Delay(Duration::from_millis(ms)));
}

#[when(expr = "merchant {word} authorizes [{word}] for {int} USD")]
async fn authorize(world: &mut LedgerWorld, merchant: String, id: String, amount: i64) {
    let request = AuthorizeRequest::new(id.as_str(), usd(amount));
    let result = world.system().flow.authorize(&merchant_ctx(&merchant), request).await;
    world.record(Some(&id), result);
}

#[when(expr = "merchant {word} authorizes [{word}] for {int} USD on behalf of merchant {word}")]
async fn authorize_for(world: &mut LedgerWorld, merchant: String, id: String, amount: i64, requested: String) {
    let request = AuthorizeRequest::new(id.as_str(), usd(amount)).with_merchant_id(requested);
    let result = world.system().flow.authorize(&merchant_ctx(&merchant), request).await;
    world.record(Some(&id), result);
}

#[when(expr = "merchant {word} sells [{word}] for {int} USD")]
async fn sale(world: &mut LedgerWorld, merchant: String, id: String, amount: i64) {
    let request = SaleRequest::new(id.as_str(), usd(amount));
    let result = world.system().flow.sale(&merchant_ctx(&merchant), request).await;
    world.record(Some(&id), result);
}

#[when(expr = "merchant {word} captures {int} USD against [{word}] as [{word}]")]
async fn capture(world: &mut LedgerWorld, merchant: String, amount: i64, root: String, id: String) {
    let request = CaptureRequest::new(id.as_str(), world.group_of(&root), usd(amount));
    let result = world.system().flow.capture(&merchant_ctx(&merchant), request).await;
    world.record(None, result);
}

#[when(expr = "merchant {word} refunds {int} USD against [{word}] as [{word}]")]
async fn refund(world: &mut LedgerWorld, merchant: String, amount: i64, root: String, id: String) {
    let request = RefundRequest::new(id.as_str(), world.group_of(&root), usd(amount));
    let result = world.system().flow.refund(&merchant_ctx(&merchant), request).await;
    world.record(None, result);
}

#[when(expr = "merchant {word} voids the authorization of [{word}] as [{word}]")]
async fn void_authorization(world: &mut LedgerWorld, merchant: String, root: String, id: String) {
    let request = VoidRequest::new(id.as_str(), world.group_of(&root), VoidTarget::Authorization);
    let result = world.system().flow.void(&merchant_ctx(&merchant), request).await;
    world.record(None, result);
}

#[when(expr = "merchant {word} voids capture [{word}] of [{word}] as [{word}]")]
async fn void_capture(world: &mut LedgerWorld, merchant: String, capture: String, root: String, id: String) {
    let target = VoidTarget::Capture(TransactionId::from(capture));
    let request = VoidRequest::new(id.as_str(), world.group_of(&root), target);
    let result = world.system().flow.void(&merchant_ctx(&merchant), request).await;
    world.record(None, result);
}

#[then("the operation is approved")]
async fn operation_approved(world: &mut LedgerWorld) {
    match world.last_result() {
        Ok(response) => assert_eq!(response.status, TransactionStatus::Approved, "{response:?}"),
        Err(e) => panic!("Operation failed: {e:?}"),
    }
}

#[then(expr = "the operation is declined")]
async fn operation_declined(world: &mut LedgerWorld) {
    match world.last_result() {
        Ok(response) => assert_eq!(response.status, TransactionStatus::Declined, "{response:?}"),
        Err(e) => panic!("Operation failed: {e:?}"),
    }
}

#[then(expr = "the operation fails with {word}")]
async fn operation_fails(world: &mut LedgerWorld, code: String) {
    match world.last_result() {
        Ok(response) => panic!("Expected {code}, but the operation succeeded: {response:?}"),
        Err(e) => assert_eq!(e.error_code(), code, "{e:?}"),
    }
}

#[then(expr = "group [{word}] has captured {int} USD and refunded {int} USD")]
async fn group_amounts(world: &mut LedgerWorld, root: String, captured: i64, refunded: i64) {
    let transactions = world.system().flow.db().list_transactions(&world.group_of(&root)).await.unwrap();
    let state = payment_ledger::GroupState::compute(&transactions);
    assert_eq!(state.captured_amount, usd(captured), "Captured amount is incorrect");
    assert_eq!(state.refunded_amount, usd(refunded), "Refunded amount is incorrect");
}

#[then(expr = "group [{word}] is {word}")]
async fn group_status(world: &mut LedgerWorld, root: String, status: String) {
    let transactions = world.system().flow.db().list_transactions(&world.group_of(&root)).await.unwrap();
    let state = payment_ledger::GroupState::compute(&transactions);
    assert_eq!(state.status().to_string(), status);
}

#[then(expr = "group [{word}] holds {int} transactions")]
async fn group_size(world: &mut LedgerWorld, root: String, count: usize) {
    let transactions = world.system().flow.db().list_transactions(&world.group_of(&root)).await.unwrap();
    assert_eq!(transactions.len(), count);
}

#[then(expr = "transaction [{word}] belongs to merchant {word}")]
async fn transaction_merchant(world: &mut LedgerWorld, id: String, merchant: String) {
    let tx = world.system().flow.db().fetch_transaction(&TransactionId::from(id)).await.unwrap();
    let tx = tx.expect("Transaction does not exist");
    assert_eq!(tx.merchant_id, MerchantId::from(merchant));
}

#[then(expr = "transaction [{word}] does not exist")]
async fn transaction_missing(world: &mut LedgerWorld, id: String) {
    let tx = world.system().flow.db().fetch_transaction(&TransactionId::from(id)).await.unwrap();
    assert!(tx.is_none(), "Transaction exists: {tx:?}");
}

#[then(expr = "the gateway has been called {int} times")]
async fn gateway_calls(world: &mut LedgerWorld, count: usize) {
    assert_eq!(world.system().gateway.call_count(), count);
}
