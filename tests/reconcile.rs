//! Reconciliation engine tests: idempotency, late recovery, terminal states,
//! orphan webhooks, and the verify/webhook race.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use paydesk::reconcile::{apply_outcome, ReconciliationEngine, WebhookChargeData, WebhookEvent};

fn engine_for(state: &AppState) -> ReconciliationEngine {
    ReconciliationEngine::new(state.db.clone(), state.notifier.clone())
}

fn charge_success_event(reference: &str, amount_minor: i64) -> WebhookEvent {
    WebhookEvent {
        event: "charge.success".to_string(),
        data: WebhookChargeData {
            reference: reference.to_string(),
            id: Some(4099260516),
            amount: Some(amount_minor),
            currency: Some("NGN".to_string()),
            customer: None,
            metadata: None,
            paid_at: Some("2024-03-01T10:15:00.000Z".to_string()),
            gateway_response: None,
        },
    }
}

#[tokio::test]
async fn test_verify_resolves_and_settles_exactly_once() {
    let gateway = FakeGateway::returning(success_outcome(105_000));
    let notifier = RecordingNotifier::default();
    let state = create_test_app_state(gateway.clone(), notifier.clone());

    let (order_id, reference) = {
        let conn = state.db.get().unwrap();
        let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
        let order = create_test_order(&conn, &tenant.id, 105_000, None);
        let txn = create_pending_transaction(
            &conn,
            &tenant.id,
            "TXN-1700000000000-a1b2c3d4e5f6",
            105_000,
            Some(&order.id),
            None,
        );
        (order.id.clone(), txn.transaction_reference)
    };

    let engine = engine_for(&state);
    let resolved = engine.verify(&gateway, &reference).await.unwrap();

    assert_eq!(resolved.status, TransactionStatus::Success);
    assert_eq!(gateway.verify_calls(), 1);
    assert_eq!(notifier.count(), 1, "settlement sends exactly one confirmation");

    let conn = state.db.get().unwrap();
    let order = queries::get_order_by_id(&conn, &order_id).unwrap().unwrap();
    assert_eq!(order.payment_status, "paid");
    assert_eq!(order.payment_reference.as_deref(), Some(reference.as_str()));
}

#[tokio::test]
async fn test_second_verify_is_idempotent_no_op() {
    let gateway = FakeGateway::returning(success_outcome(105_000));
    let notifier = RecordingNotifier::default();
    let state = create_test_app_state(gateway.clone(), notifier.clone());

    let reference = {
        let conn = state.db.get().unwrap();
        let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
        let order = create_test_order(&conn, &tenant.id, 105_000, None);
        create_pending_transaction(
            &conn,
            &tenant.id,
            "TXN-1700000000001-a1b2c3d4e5f6",
            105_000,
            Some(&order.id),
            None,
        )
        .transaction_reference
    };

    let engine = engine_for(&state);
    let first = engine.verify(&gateway, &reference).await.unwrap();
    let second = engine.verify(&gateway, &reference).await.unwrap();

    // Identical state on both calls, one settlement side effect, and the
    // second call never reached the gateway.
    assert_eq!(first.status, TransactionStatus::Success);
    assert_eq!(second.status, TransactionStatus::Success);
    assert_eq!(second.id, first.id);
    assert_eq!(second.paid_at, first.paid_at);
    assert_eq!(gateway.verify_calls(), 1, "cached success short-circuits the gateway call");
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn test_failed_transaction_recovers_to_success() {
    let gateway = FakeGateway::returning(failed_outcome("Declined"));
    let notifier = RecordingNotifier::default();
    let state = create_test_app_state(gateway.clone(), notifier.clone());

    let (invoice_id, reference) = {
        let conn = state.db.get().unwrap();
        let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
        let invoice = create_test_invoice(&conn, &tenant.id, 105_000);
        let txn = create_pending_transaction(
            &conn,
            &tenant.id,
            "TXN-1700000000002-a1b2c3d4e5f6",
            105_000,
            None,
            Some(&invoice.id),
        );
        (invoice.id.clone(), txn.transaction_reference)
    };

    let engine = engine_for(&state);
    let failed = engine.verify(&gateway, &reference).await.unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("Declined"));
    assert_eq!(notifier.count(), 0, "failed outcomes never settle");

    // The gateway later reports success for the same reference
    // (failed -> success is a legal transition).
    gateway.set_outcome(success_outcome(105_000));
    let recovered = engine.verify(&gateway, &reference).await.unwrap();
    assert_eq!(recovered.status, TransactionStatus::Success);
    assert_eq!(recovered.failure_reason, None);
    assert_eq!(notifier.count(), 1);

    let conn = state.db.get().unwrap();
    let invoice = queries::get_invoice_by_id(&conn, &invoice_id).unwrap().unwrap();
    assert_eq!(invoice.status, "paid");
}

#[tokio::test]
async fn test_success_is_terminal_against_later_failed_reports() {
    let gateway = FakeGateway::returning(success_outcome(105_000));
    let notifier = RecordingNotifier::default();
    let state = create_test_app_state(gateway.clone(), notifier.clone());

    let (tenant, reference) = {
        let conn = state.db.get().unwrap();
        let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
        let txn = create_pending_transaction(
            &conn,
            &tenant.id,
            "TXN-1700000000003-a1b2c3d4e5f6",
            105_000,
            None,
            None,
        );
        (tenant, txn.transaction_reference)
    };

    let engine = engine_for(&state);
    let resolved = engine.verify(&gateway, &reference).await.unwrap();
    assert_eq!(resolved.status, TransactionStatus::Success);

    // A direct failed outcome against the row is a no-op under the CAS guard.
    {
        let mut conn = state.db.get().unwrap();
        let resolution =
            apply_outcome(&mut conn, &reference, &failed_outcome("late failure")).unwrap();
        assert_eq!(resolution.transaction.status, TransactionStatus::Success);
        assert!(resolution.confirmation.is_none());
    }

    // And so is a late charge.failed webhook.
    let event = WebhookEvent {
        event: "charge.failed".to_string(),
        data: WebhookChargeData {
            reference: reference.clone(),
            id: None,
            amount: Some(105_000),
            currency: Some("NGN".to_string()),
            customer: None,
            metadata: None,
            paid_at: None,
            gateway_response: Some("Insufficient funds".to_string()),
        },
    };
    let after_webhook = engine
        .apply_webhook(&tenant, GatewayName::Paystack, TEST_FEE_CAP_MINOR, &event, "{}")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after_webhook.status, TransactionStatus::Success);
    assert_eq!(after_webhook.failure_reason, None);
}

#[tokio::test]
async fn test_orphan_webhook_synthesizes_one_transaction() {
    let gateway = FakeGateway::returning(success_outcome(105_000));
    let notifier = RecordingNotifier::default();
    let state = create_test_app_state(gateway.clone(), notifier.clone());

    let tenant = {
        let conn = state.db.get().unwrap();
        create_test_tenant(&conn, "Shop", Plan::Standard).0
    };

    let reference = "TXN-1700000000004-a1b2c3d4e5f6";
    let event = charge_success_event(reference, 105_000);

    let engine = engine_for(&state);
    let first = engine
        .apply_webhook(&tenant, GatewayName::Paystack, TEST_FEE_CAP_MINOR, &event, "{}")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, TransactionStatus::Success);
    assert_eq!(first.amount_minor, 105_000);
    // 3% of 1050.00 = 31.50, under the cap
    assert_eq!(first.platform_fee_minor, 3_150);
    assert_eq!(first.merchant_amount_minor, 101_850);

    // Redelivery observes the settled state, creates nothing.
    let second = engine
        .apply_webhook(&tenant, GatewayName::Paystack, TEST_FEE_CAP_MINOR, &event, "{}")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, first.id);

    let conn = state.db.get().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM payment_transactions WHERE transaction_reference = ?1",
            [reference],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_orphan_upsert_single_row_under_concurrent_duplicates() {
    let (pool, _dir) = create_file_backed_pool();
    let tenant = {
        let conn = pool.get().unwrap();
        create_test_tenant(&conn, "Shop", Plan::Standard).0
    };

    let reference = "TXN-1700000000005-a1b2c3d4e5f6";
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            let tenant_id = tenant.id.clone();
            let reference = reference.to_string();
            thread::spawn(move || {
                let conn = pool.get().unwrap();
                let split = paydesk::fees::compute(105_000, 300, TEST_FEE_CAP_MINOR);
                let create = CreateTransaction {
                    tenant_id,
                    transaction_reference: reference,
                    amount_minor: 105_000,
                    currency: "NGN".to_string(),
                    platform_fee_minor: split.platform_fee_minor,
                    merchant_amount_minor: split.merchant_amount_minor,
                    status: TransactionStatus::Pending,
                    gateway_name: GatewayName::Paystack,
                    gateway_transaction_id: None,
                    customer_email: "buyer@example.com".to_string(),
                    customer_name: None,
                    order_id: None,
                    invoice_id: None,
                    gateway_response: None,
                    paid_at: None,
                    failure_reason: None,
                };
                barrier.wait();
                queries::insert_transaction_if_absent(&conn, &create).unwrap()
            })
        })
        .collect();

    let inserted: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        inserted.iter().filter(|&&b| b).count(),
        1,
        "exactly one delivery wins the insert"
    );

    let conn = pool.get().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM payment_transactions WHERE transaction_reference = ?1",
            [reference],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

/// The central correctness property: verify and webhook reach the critical
/// section near-simultaneously, the true outcome lands once, settlement is
/// applied exactly once.
#[test]
fn test_verify_webhook_race_settles_exactly_once() {
    let (pool, _dir) = create_file_backed_pool();

    let (order_id, reference) = {
        let conn = pool.get().unwrap();
        let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
        let order = create_test_order(&conn, &tenant.id, 105_000, None);
        let txn = create_pending_transaction(
            &conn,
            &tenant.id,
            "TXN-1700000000006-a1b2c3d4e5f6",
            105_000,
            Some(&order.id),
            None,
        );
        (order.id.clone(), txn.transaction_reference)
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            let reference = reference.clone();
            thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                let outcome = success_outcome(105_000);
                barrier.wait();
                apply_outcome(&mut conn, &reference, &outcome).unwrap()
            })
        })
        .collect();

    let resolutions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for resolution in &resolutions {
        assert_eq!(resolution.transaction.status, TransactionStatus::Success);
    }
    assert_eq!(
        resolutions.iter().filter(|r| r.confirmation.is_some()).count(),
        1,
        "exactly one path performs the settlement side effect"
    );

    let conn = pool.get().unwrap();
    let order = queries::get_order_by_id(&conn, &order_id).unwrap().unwrap();
    assert_eq!(order.payment_status, "paid");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_notify_once() {
    let gateway = FakeGateway::returning(success_outcome(105_000));
    let notifier = RecordingNotifier::default();
    let (state, _dir) = create_file_backed_state(gateway, notifier.clone());

    let reference = {
        let conn = state.db.get().unwrap();
        let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
        let order = create_test_order(&conn, &tenant.id, 105_000, None);
        create_pending_transaction(
            &conn,
            &tenant.id,
            "TXN-1700000000007-a1b2c3d4e5f6",
            105_000,
            Some(&order.id),
            None,
        )
        .transaction_reference
    };

    let engine = ReconciliationEngine::new(state.db.clone(), state.notifier.clone());
    let outcome = success_outcome(105_000);

    let a = {
        let engine = engine.clone();
        let reference = reference.clone();
        let outcome = outcome.clone();
        tokio::spawn(async move { engine.resolve(&reference, &outcome).await })
    };
    let b = {
        let engine = engine.clone();
        let reference = reference.clone();
        let outcome = outcome.clone();
        tokio::spawn(async move { engine.resolve(&reference, &outcome).await })
    };

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    assert_eq!(first.status, TransactionStatus::Success);
    assert_eq!(second.status, TransactionStatus::Success);
    assert_eq!(notifier.count(), 1);
}
