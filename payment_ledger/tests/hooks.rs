use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use log::*;
use payment_ledger::{
    db_types::{GroupId, TransactionType, VoidTarget},
    events::{EventHandlers, EventHooks, GroupClosedEvent},
    test_utils::MockResponse,
    transaction_objects::{AuthorizeRequest, CaptureRequest, RefundRequest, VoidRequest},
    GroupStatus,
};

mod support;

use support::{dollars, merchant, setup_with_producers, tear_down};

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

/// Handlers run on their own tasks, so give them a moment to catch up.
async fn wait_for(hook: &HookCalled, expected: i32) {
    for _ in 0..100 {
        if hook.count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn recorded_hook_fires_once_per_new_row() {
    let recorded = HookCalled::default();
    let recorded_copy = recorded.clone();
    let types = Arc::new(Mutex::new(Vec::new()));
    let types_copy = Arc::clone(&types);
    let mut hooks = EventHooks::default();
    hooks.on_transaction_recorded(move |ev| {
        info!("🪝️ {:?}", ev.transaction.id);
        types_copy.lock().unwrap().push(ev.transaction.transaction_type);
        recorded_copy.called();
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(10, hooks);
    let ledger = setup_with_producers(handlers.producers()).await;
    handlers.start_handlers().await;

    let ctx = merchant(&["m1"]);
    let auth = AuthorizeRequest::new("auth", dollars(20));
    let group = ledger.flow.authorize(&ctx, auth.clone()).await.unwrap().group_id;
    ledger.flow.authorize(&ctx, auth).await.unwrap();
    ledger.gateway.push(MockResponse::Decline("05".into()));
    ledger.flow.capture(&ctx, CaptureRequest::new("cap-1", group.clone(), dollars(5))).await.unwrap();
    ledger.flow.capture(&ctx, CaptureRequest::new("cap-2", group.clone(), dollars(5))).await.unwrap();
    // Rejected by the group state, so nothing is recorded
    let _ = ledger.flow.capture(&ctx, CaptureRequest::new("cap-3", group, dollars(50))).await.unwrap_err();

    wait_for(&recorded, 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorded.count(), 3);
    let mut seen = types.lock().unwrap().clone();
    seen.sort_by_key(|t| t.to_string());
    assert_eq!(seen, [TransactionType::Auth, TransactionType::Capture, TransactionType::Capture]);
    tear_down(ledger).await;
}

#[tokio::test]
async fn group_closed_hook_fires_on_terminal_transitions() {
    let closed = HookCalled::default();
    let closed_copy = closed.clone();
    let events: Arc<Mutex<Vec<GroupClosedEvent>>> = Arc::default();
    let events_copy = Arc::clone(&events);
    let mut hooks = EventHooks::default();
    hooks.on_group_closed(move |ev| {
        info!("🪝️ Group {} closed as {}", ev.group_id, ev.status);
        events_copy.lock().unwrap().push(ev);
        closed_copy.called();
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(10, hooks);
    let ledger = setup_with_producers(handlers.producers()).await;
    handlers.start_handlers().await;

    let ctx = merchant(&["m1"]);
    let voided = ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-1", dollars(20))).await.unwrap().group_id;
    let void = VoidRequest::new("void-1", voided.clone(), VoidTarget::Authorization);
    ledger.flow.void(&ctx, void.clone()).await.unwrap();
    ledger.flow.void(&ctx, void).await.unwrap();

    let refunded = ledger.flow.authorize(&ctx, AuthorizeRequest::new("auth-2", dollars(20))).await.unwrap().group_id;
    ledger.flow.capture(&ctx, CaptureRequest::new("cap", refunded.clone(), dollars(20))).await.unwrap();
    ledger.flow.refund(&ctx, RefundRequest::new("ref-1", refunded.clone(), dollars(10))).await.unwrap();
    ledger.flow.refund(&ctx, RefundRequest::new("ref-2", refunded.clone(), dollars(10))).await.unwrap();

    wait_for(&closed, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(closed.count(), 2);
    let events = events.lock().unwrap().clone();
    let status_of = |group: &GroupId| events.iter().find(|e| &e.group_id == group).map(|e| e.status);
    assert_eq!(status_of(&voided), Some(GroupStatus::Voided));
    assert_eq!(status_of(&refunded), Some(GroupStatus::FullyRefunded));
    assert!(events.iter().all(|e| e.merchant_id.as_str() == "m1"));
    tear_down(ledger).await;
}
