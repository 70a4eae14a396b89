//! Settlement applier tests: conditional writes and notification gating.

mod common;

use common::*;
use paydesk::settlement::{self, SettlementOutcome};

#[test]
fn test_try_settle_order_changes_row_exactly_once() {
    let conn = setup_test_db();
    let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
    let order = create_test_order(&conn, &tenant.id, 105_000, None);

    let first = queries::try_settle_order(&conn, &order.id, "TXN-1-a", 1_709_288_100).unwrap();
    assert!(first, "first settle reports a changed row");

    let second = queries::try_settle_order(&conn, &order.id, "TXN-2-b", 1_709_288_200).unwrap();
    assert!(!second, "second settle is a no-op");

    // The first writer's fields stick.
    let order = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.payment_status, "paid");
    assert_eq!(order.payment_reference.as_deref(), Some("TXN-1-a"));
    assert_eq!(order.paid_at, Some(1_709_288_100));
}

#[test]
fn test_try_settle_invoice_changes_row_exactly_once() {
    let conn = setup_test_db();
    let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
    let invoice = create_test_invoice(&conn, &tenant.id, 105_000);

    assert!(queries::try_settle_invoice(&conn, &invoice.id, "TXN-1-a", 1_709_288_100).unwrap());
    assert!(!queries::try_settle_invoice(&conn, &invoice.id, "TXN-2-b", 1_709_288_200).unwrap());

    let invoice = queries::get_invoice_by_id(&conn, &invoice.id).unwrap().unwrap();
    assert_eq!(invoice.status, "paid");
    assert_eq!(invoice.payment_reference.as_deref(), Some("TXN-1-a"));
}

#[test]
fn test_apply_notifies_only_on_first_settlement() {
    let conn = setup_test_db();
    let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
    let order = create_test_order(&conn, &tenant.id, 105_000, None);
    let mut txn = create_pending_transaction(
        &conn,
        &tenant.id,
        "TXN-1700000000300-a1b2c3d4e5f6",
        105_000,
        Some(&order.id),
        None,
    );
    txn.paid_at = Some(1_709_288_100);

    match settlement::apply(&conn, &txn).unwrap() {
        SettlementOutcome::Applied(confirmation) => {
            assert_eq!(confirmation.to_email, "buyer@example.com");
            assert_eq!(confirmation.target_kind, "order");
            assert_eq!(confirmation.target_id, order.id);
            assert_eq!(confirmation.amount_minor, 105_000);
        }
        other => panic!("expected Applied, got {:?}", other),
    }

    // Replay: the conditional write reports no change, so no notification.
    match settlement::apply(&conn, &txn).unwrap() {
        SettlementOutcome::AlreadySettled => {}
        other => panic!("expected AlreadySettled, got {:?}", other),
    }
}

#[test]
fn test_apply_with_no_target_is_no_op() {
    let conn = setup_test_db();
    let (tenant, _) = create_test_tenant(&conn, "Shop", Plan::Standard);
    let txn = create_pending_transaction(
        &conn,
        &tenant.id,
        "TXN-1700000000301-a1b2c3d4e5f6",
        105_000,
        None,
        None,
    );

    match settlement::apply(&conn, &txn).unwrap() {
        SettlementOutcome::NoTarget => {}
        other => panic!("expected NoTarget, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dispatch_swallows_notifier_failures() {
    use async_trait::async_trait;

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn send_payment_confirmation(
            &self,
            _confirmation: &PaymentConfirmation,
        ) -> Result<()> {
            Err(AppError::Internal("mail transport down".into()))
        }
    }

    let confirmation = PaymentConfirmation {
        to_email: "buyer@example.com".to_string(),
        customer_name: None,
        reference: "TXN-1700000000302-a1b2c3d4e5f6".to_string(),
        amount_minor: 105_000,
        currency: "NGN".to_string(),
        target_kind: "order",
        target_id: "order-1".to_string(),
    };

    // Must not panic or propagate - a dead mail transport never reverses
    // a committed settlement.
    settlement::dispatch_confirmation(&BrokenNotifier, &confirmation).await;
}
