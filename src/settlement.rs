//! Settlement: the single downstream effect of a successful transaction.
//!
//! The caller (ReconciliationEngine) invokes `apply` exactly once per
//! resolution, inside its locked storage transaction. Even so, the update is
//! a conditional write ("only if not already paid") whose affected-row count
//! says whether this call changed anything - replayed webhooks stay silent
//! even if the outer lock were ever bypassed.

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::email::{confirmation_for, Notifier, PaymentConfirmation};
use crate::error::Result;
use crate::models::PaymentTransaction;

/// What settlement did for a just-successful transaction.
#[derive(Debug)]
pub enum SettlementOutcome {
    /// The transaction has no order or invoice attached.
    NoTarget,
    /// The target was already paid; nothing changed, nobody is notified.
    AlreadySettled,
    /// This call flipped the target to paid. The confirmation is dispatched
    /// by the caller after its storage transaction commits.
    Applied(PaymentConfirmation),
}

/// Apply the at-most-one conditional update for a transaction that has just
/// transitioned to success. Must run inside the caller's storage transaction.
pub fn apply(conn: &Connection, transaction: &PaymentTransaction) -> Result<SettlementOutcome> {
    let paid_at = transaction.paid_at.unwrap_or_else(|| Utc::now().timestamp());

    if let Some(order_id) = &transaction.order_id {
        let changed = queries::try_settle_order(
            conn,
            order_id,
            &transaction.transaction_reference,
            paid_at,
        )?;
        return Ok(if changed {
            SettlementOutcome::Applied(confirmation_for(transaction, "order", order_id))
        } else {
            SettlementOutcome::AlreadySettled
        });
    }

    if let Some(invoice_id) = &transaction.invoice_id {
        let changed = queries::try_settle_invoice(
            conn,
            invoice_id,
            &transaction.transaction_reference,
            paid_at,
        )?;
        return Ok(if changed {
            SettlementOutcome::Applied(confirmation_for(transaction, "invoice", invoice_id))
        } else {
            SettlementOutcome::AlreadySettled
        });
    }

    Ok(SettlementOutcome::NoTarget)
}

/// Request the confirmation notification. Failures are logged and swallowed;
/// a dead mail transport never reverses a committed settlement.
pub async fn dispatch_confirmation(notifier: &dyn Notifier, confirmation: &PaymentConfirmation) {
    if let Err(e) = notifier.send_payment_confirmation(confirmation).await {
        tracing::warn!(
            "Failed to send payment confirmation for {}: {}",
            confirmation.reference,
            e
        );
    }
}
