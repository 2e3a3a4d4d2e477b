use payment_ledger::{
    authorization::{ActorType, SCOPE_TRANSACTIONS_READ},
    db_types::{GroupId, MerchantId, TransactionId},
    transaction_objects::{AuthorizeRequest, CaptureRequest, TransactionQueryFilter},
    AuthClaims,
    AuthContext,
    LedgerApiError,
};

mod support;

use support::{admin, customer, dollars, guest, merchant, service, setup, tear_down};

fn assert_not_found<T: std::fmt::Debug>(result: Result<T, LedgerApiError>) -> LedgerApiError {
    match result {
        Err(e @ LedgerApiError::NotFound) => e,
        other => panic!("Expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn single_tenant_merchant_charges_its_own_merchant() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    let request = AuthorizeRequest::new("auth", dollars(10)).with_merchant_id("m2");
    let auth = ledger.flow.authorize(&ctx, request).await.unwrap();
    let stored = ledger.query.fetch_transaction(&admin(), &auth.transaction_id).await.unwrap();
    assert_eq!(stored.merchant_id, MerchantId::from("m1"));
    tear_down(ledger).await;
}

#[tokio::test]
async fn operator_must_pick_one_of_its_merchants() {
    let ledger = setup().await;
    let ctx = merchant(&["m1", "m2"]);
    let err = ledger.flow.authorize(&ctx, AuthorizeRequest::new("a", dollars(10))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::Validation(_)), "{err:?}");
    assert_not_found(ledger.flow.authorize(&ctx, AuthorizeRequest::new("b", dollars(10)).with_merchant_id("m3")).await);
    let ok = ledger.flow.authorize(&ctx, AuthorizeRequest::new("c", dollars(10)).with_merchant_id("m2")).await;
    assert!(ok.is_ok());
    assert_eq!(ledger.gateway.call_count(), 1);
    tear_down(ledger).await;
}

#[tokio::test]
async fn services_are_held_to_their_allow_list() {
    let ledger = setup().await;
    let ctx = service(&["m1"]);
    let allowed = AuthorizeRequest::new("auth-1", dollars(10)).with_merchant_id("m1").with_session_id("s1");
    ledger.flow.authorize(&ctx, allowed).await.unwrap();
    let denied = AuthorizeRequest::new("auth-2", dollars(10)).with_merchant_id("m2");
    assert_not_found(ledger.flow.authorize(&ctx, denied).await);
    let wildcard = service(&["*"]);
    let any = AuthorizeRequest::new("auth-3", dollars(10)).with_merchant_id("m9");
    assert!(ledger.flow.authorize(&wildcard, any).await.is_ok());
    tear_down(ledger).await;
}

#[tokio::test]
async fn another_merchants_group_looks_like_a_missing_one() {
    let ledger = setup().await;
    let owner = merchant(&["m1"]);
    let intruder = merchant(&["m2"]);
    let auth = ledger.flow.authorize(&owner, AuthorizeRequest::new("auth", dollars(100))).await.unwrap();

    let hidden = assert_not_found(
        ledger.flow.capture(&intruder, CaptureRequest::new("cap", auth.group_id.clone(), dollars(10))).await,
    );
    let missing = assert_not_found(
        ledger.flow.capture(&intruder, CaptureRequest::new("cap", GroupId::from("grp_none"), dollars(10))).await,
    );
    assert_eq!(hidden.to_string(), missing.to_string());
    assert_eq!(format!("{hidden:?}"), format!("{missing:?}"));
    // The intruder's failed attempt must not stop the owner from using the same transaction id
    ledger.flow.capture(&owner, CaptureRequest::new("cap", auth.group_id.clone(), dollars(10))).await.unwrap();
    assert_eq!(ledger.gateway.call_count(), 2);
    tear_down(ledger).await;
}

#[tokio::test]
async fn another_merchants_transaction_id_looks_unused() {
    let ledger = setup().await;
    let owner = merchant(&["m1"]);
    let intruder = merchant(&["m2"]);
    let auth = ledger.flow.authorize(&owner, AuthorizeRequest::new("auth", dollars(100))).await.unwrap();
    ledger.flow.capture(&owner, CaptureRequest::new("cap", auth.group_id.clone(), dollars(10))).await.unwrap();

    assert_not_found(ledger.flow.authorize(&intruder, AuthorizeRequest::new("auth", dollars(100))).await);
    assert_not_found(ledger.flow.authorize(&intruder, AuthorizeRequest::new("cap", dollars(5))).await);
    // The owner still gets a conflict for its own id
    let err = ledger.flow.authorize(&owner, AuthorizeRequest::new("cap", dollars(5))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::IdempotencyConflict), "{err:?}");
    assert_eq!(ledger.gateway.call_count(), 2);
    tear_down(ledger).await;
}

#[tokio::test]
async fn customers_only_see_their_own_groups() {
    let ledger = setup().await;
    let ctx = merchant(&["m1"]);
    let alice = ledger.flow.authorize(&ctx, AuthorizeRequest::new("a-1", dollars(10)).with_customer_id("alice")).await;
    let alice = alice.unwrap();
    ledger.flow.authorize(&ctx, AuthorizeRequest::new("b-1", dollars(20)).with_customer_id("bob")).await.unwrap();

    let as_alice = customer("alice");
    let as_bob = customer("bob");
    assert!(ledger.query.fetch_group(&as_alice, &alice.group_id).await.is_ok());
    let hidden = assert_not_found(ledger.query.fetch_group(&as_bob, &alice.group_id).await);
    let missing = assert_not_found(ledger.query.fetch_group(&as_bob, &GroupId::from("grp_none")).await);
    assert_eq!(hidden.to_string(), missing.to_string());
    assert_eq!(format!("{hidden:?}"), format!("{missing:?}"));

    let listed = ledger.query.list_transactions(&as_bob, TransactionQueryFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, TransactionId::from("b-1"));
    tear_down(ledger).await;
}

#[tokio::test]
async fn customers_and_guests_cannot_move_money() {
    let ledger = setup().await;
    let request = AuthorizeRequest::new("auth", dollars(10)).with_merchant_id("m1");
    let err = ledger.flow.authorize(&customer("alice"), request.clone()).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::PermissionDenied(_)), "{err:?}");
    let err = ledger.flow.authorize(&guest("s1"), request).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::PermissionDenied(_)), "{err:?}");
    assert_eq!(ledger.gateway.call_count(), 0);
    tear_down(ledger).await;
}

#[tokio::test]
async fn guests_read_follow_ons_through_their_session() {
    let ledger = setup().await;
    let ctx = service(&["m1"]);
    let request = AuthorizeRequest::new("auth", dollars(10)).with_merchant_id("m1").with_session_id("s1");
    let auth = ledger.flow.authorize(&ctx, request).await.unwrap();
    let capture = CaptureRequest::new("cap", auth.group_id.clone(), dollars(10)).with_merchant_id("m1");
    ledger.flow.capture(&ctx, capture).await.unwrap();

    let cap = TransactionId::from("cap");
    assert!(ledger.query.fetch_transaction(&guest("s1"), &cap).await.is_ok());
    assert_not_found(ledger.query.fetch_transaction(&guest("s2"), &cap).await);
    let err = ledger.query.list_transactions(&guest("s1"), TransactionQueryFilter::default()).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::PermissionDenied(_)), "{err:?}");
    tear_down(ledger).await;
}

#[tokio::test]
async fn listings_are_narrowed_to_the_callers_merchants() {
    let ledger = setup().await;
    let ops = admin();
    for (id, m) in [("t1", "m1"), ("t2", "m2"), ("t3", "m1"), ("t4", "m3")] {
        ledger.flow.authorize(&ops, AuthorizeRequest::new(id, dollars(5)).with_merchant_id(m)).await.unwrap();
    }
    let everything = ledger.query.list_transactions(&ops, TransactionQueryFilter::default()).await.unwrap();
    assert_eq!(everything.len(), 4);
    let ids = everything.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, ["t1", "t2", "t3", "t4"]);

    let m1 = ledger.query.list_transactions(&merchant(&["m1"]), TransactionQueryFilter::default()).await.unwrap();
    assert_eq!(m1.len(), 2);
    assert!(m1.iter().all(|t| t.merchant_id.as_str() == "m1"));

    let asks_for_m2 = TransactionQueryFilter::default().with_merchant_id(MerchantId::from("m2"));
    let none = ledger.query.list_transactions(&merchant(&["m1"]), asks_for_m2).await.unwrap();
    assert!(none.is_empty());

    let svc = ledger.query.list_transactions(&service(&["m2", "m3"]), TransactionQueryFilter::default()).await.unwrap();
    assert_eq!(svc.len(), 2);
    tear_down(ledger).await;
}

#[tokio::test]
async fn missing_scopes_are_permission_denied() {
    let ledger = setup().await;
    let read_only = AuthClaims::new(ActorType::Merchant, "reporting")
        .with_merchant_ids(&["m1"])
        .with_scopes(&[SCOPE_TRANSACTIONS_READ]);
    let read_only = AuthContext::new(read_only).unwrap();
    let err = ledger.flow.authorize(&read_only, AuthorizeRequest::new("auth", dollars(1))).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::PermissionDenied(_)), "{err:?}");
    let no_scopes = AuthContext::new(AuthClaims::new(ActorType::Merchant, "bare").with_merchant_ids(&["m1"])).unwrap();
    let err = ledger.query.list_transactions(&no_scopes, TransactionQueryFilter::default()).await.unwrap_err();
    assert!(matches!(err, LedgerApiError::PermissionDenied(_)), "{err:?}");
    assert!(ledger.query.list_transactions(&read_only, TransactionQueryFilter::default()).await.unwrap().is_empty());
    tear_down(ledger).await;
}
