use std::time::Duration;

use payment_ledger::{
    db_types::{TransactionId, TransactionStatus},
    test_utils::MockResponse,
    transaction_objects::AuthorizeRequest,
    LedgerApiError,
    LedgerStore,
};

mod support;

use support::{admin, dollars, merchant, setup, tear_down};

#[tokio::test]
async fn replayed_authorization_calls_the_gateway_once() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    let request = AuthorizeRequest::new("auth-1", dollars(100)).with_customer_id("c1");
    let first = ledger.flow.authorize(&ctx, request.clone()).await.expect("first attempt");
    let second = ledger.flow.authorize(&ctx, request).await.expect("replayed attempt");
    assert_eq!(first, second);
    assert_eq!(first.status, TransactionStatus::Approved);
    assert_eq!(ledger.gateway.call_count(), 1);
    let rows = ledger.flow.db().list_transactions(&first.group_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    tear_down(ledger).await;
}

#[tokio::test]
async fn declined_attempt_is_replayed_not_retried() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    ledger.gateway.push(MockResponse::Decline("05".into()));
    let declined = ledger.flow.authorize(&ctx, AuthorizeRequest::new("a1", dollars(40))).await.unwrap();
    assert_eq!(declined.status, TransactionStatus::Declined);
    let retried = ledger.flow.authorize(&ctx, AuthorizeRequest::new("a1", dollars(40))).await.unwrap();
    assert_eq!(retried, declined);
    assert_eq!(ledger.gateway.call_count(), 1);
    let fresh = ledger.flow.authorize(&ctx, AuthorizeRequest::new("a2", dollars(45))).await.unwrap();
    assert_eq!(fresh.status, TransactionStatus::Approved);
    assert_ne!(fresh.group_id, declined.group_id);
    assert_eq!(ledger.gateway.call_count(), 2);
    let stored = ledger.query.fetch_transaction(&admin(), &TransactionId::from("a1")).await.unwrap();
    assert_eq!(stored.gateway_result_code, "05");
    tear_down(ledger).await;
}

#[tokio::test]
async fn reused_id_with_a_different_request_is_a_conflict() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-1", dollars(100))).await.unwrap();
    let err = ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-1", dollars(200))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::IdempotencyConflict), "{err:?}");
    let err = ledger.flow.sale(&ctx, AuthorizeRequest::new("auth-1", dollars(100))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::IdempotencyConflict), "{err:?}");
    assert_eq!(ledger.gateway.call_count(), 1);
    tear_down(ledger).await;
}

#[tokio::test]
async fn concurrent_calls_with_the_same_id_commit_one_row() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    ledger.gateway.push(MockResponse::Delay(Duration::from_millis(50)));
    ledger.gateway.push(MockResponse::Delay(Duration::from_millis(50)));
    let request = AuthorizeRequest::new("auth-race", dollars(20));
    let (a, b) = tokio::join!(ledger.flow.authorize(&ctx, request.clone()), ledger.flow.authorize(&ctx, request));
    let a = a.expect("first caller");
    let b = b.expect("second caller");
    assert_eq!(a, b);
    let rows = ledger.flow.db().list_transactions(&a.group_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(ledger.gateway.call_count() <= 2);
    tear_down(ledger).await;
}

#[tokio::test]
async fn gateway_outage_persists_nothing() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    ledger.gateway.push(MockResponse::Unavailable);
    let err = ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-1", dollars(10))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::GatewayUnavailable), "{err:?}");
    assert!(err.is_retryable());
    let lookup = ledger.query.fetch_transaction(&admin(), &TransactionId::from("auth-1")).await;
    assert!(matches!(lookup, Err(LedgerApiError::NotFound)));
    // The retry reaches the gateway again, and this time it answers
    let retried = ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-1", dollars(10))).await.unwrap();
    assert_eq!(retried.status, TransactionStatus::Approved);
    assert_eq!(ledger.gateway.call_count(), 2);
    tear_down(ledger).await;
}

#[tokio::test]
async fn gateway_timeout_persists_nothing() {
    let mut ledger = setup().await;
    ledger.flow = ledger.flow.with_gateway_timeout(Duration::from_millis(20));
    let ctx = merchant(&["m1"]);
    ledger.gateway.push(MockResponse::Delay(Duration::from_millis(500)));
    let err = ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-slow", dollars(10))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::GatewayUnavailable), "{err:?}");
    let lookup = ledger.flow.db().fetch_transaction(&TransactionId::from("auth-slow")).await.unwrap();
    assert!(lookup.is_none());
    tear_down(ledger).await;
}
