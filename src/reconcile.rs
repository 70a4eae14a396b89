//! Transaction reconciliation.
//!
//! Two independent, unordered triggers report a charge's outcome: the
//! client-initiated verify call and the gateway-pushed webhook. Both funnel
//! into the same lock + compare-and-swap + settle sequence (`apply_outcome`),
//! so whichever arrives first wins and the second becomes a no-op observing
//! the already-settled state. Correctness comes entirely from the storage
//! layer - the two triggers may land on different processes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use serde_json::Value;

use crate::db::{queries, AppState, DbPool};
use crate::email::{Notifier, PaymentConfirmation};
use crate::error::{OptionExt, Result};
use crate::fees;
use crate::gateways::{GatewayAdapter, VerifyOutcome};
use crate::models::{
    CreateTransaction, GatewayName, PaymentTransaction, Tenant, TransactionStatus,
};
use crate::settlement::{self, SettlementOutcome};

/// How many stale pending transactions one sweep pass re-verifies.
const SWEEP_BATCH: i64 = 50;

/// Inbound webhook body: `{event, data}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookChargeData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChargeData {
    pub reference: String,
    /// Gateway transaction id.
    pub id: Option<i64>,
    /// Minor units.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub customer: Option<WebhookCustomer>,
    pub metadata: Option<Value>,
    pub paid_at: Option<String>,
    pub gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookCustomer {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Result of one pass through the critical section.
pub struct Resolution {
    pub transaction: PaymentTransaction,
    /// Set only when this resolution flipped a settlement target to paid.
    pub confirmation: Option<PaymentConfirmation>,
}

/// The lock + compare-and-swap + settle critical section, shared by both
/// trigger paths.
///
/// BEGIN IMMEDIATE takes the write lock up front (the SQLite equivalent of
/// an exclusive row lock), so the re-read inside cannot race another writer:
/// if a concurrent resolution already landed success, the re-check turns
/// this call into a no-op. The gateway HTTP call never happens in here.
pub fn apply_outcome(
    conn: &mut Connection,
    reference: &str,
    outcome: &VerifyOutcome,
) -> Result<Resolution> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current =
        queries::get_transaction_by_reference(&tx, reference)?.or_not_found("Transaction")?;

    // Re-check under the lock: the other trigger may have resolved this
    // transaction between our earlier read and acquiring the lock.
    if current.status.is_terminal() {
        return Ok(Resolution {
            transaction: current,
            confirmation: None,
        });
    }

    if let Some(reported) = outcome.amount_minor {
        if reported != current.amount_minor {
            tracing::warn!(
                "Gateway reports amount {} for {} but {} was initiated",
                reported,
                reference,
                current.amount_minor
            );
        }
    }

    let raw = if outcome.raw.is_null() {
        None
    } else {
        Some(serde_json::to_string(&outcome.raw)?)
    };
    // A success with no gateway timestamp still gets stamped.
    let paid_at = match outcome.status {
        TransactionStatus::Success => outcome.paid_at.or_else(|| Some(Utc::now().timestamp())),
        _ => outcome.paid_at,
    };
    let changed = queries::try_resolve_transaction(
        &tx,
        reference,
        outcome.status,
        outcome.gateway_tx_id.as_deref(),
        raw.as_deref(),
        paid_at,
        outcome.failure_reason.as_deref(),
    )?;

    let transaction =
        queries::get_transaction_by_reference(&tx, reference)?.or_not_found("Transaction")?;

    let confirmation = if changed && transaction.status == TransactionStatus::Success {
        match settlement::apply(&tx, &transaction)? {
            SettlementOutcome::Applied(confirmation) => Some(confirmation),
            SettlementOutcome::AlreadySettled | SettlementOutcome::NoTarget => None,
        }
    } else {
        None
    };

    tx.commit()?;

    Ok(Resolution {
        transaction,
        confirmation,
    })
}

/// Resolves transactions to terminal outcomes, idempotently, from either
/// trigger. Collaborators are constructor-injected so tests can run the
/// engine against fakes.
#[derive(Clone)]
pub struct ReconciliationEngine {
    db: DbPool,
    notifier: Arc<dyn Notifier>,
}

impl ReconciliationEngine {
    pub fn new(db: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Verify path (synchronous trigger: client call or redirect).
    ///
    /// An already-successful transaction short-circuits without a gateway
    /// call. Otherwise the gateway is polled outside any lock, then the
    /// outcome funnels into the shared critical section.
    pub async fn verify(
        &self,
        adapter: &dyn GatewayAdapter,
        reference: &str,
    ) -> Result<PaymentTransaction> {
        let existing = {
            let conn = self.db.get()?;
            queries::get_transaction_by_reference(&conn, reference)?.or_not_found("Transaction")?
        };
        if existing.status.is_terminal() {
            return Ok(existing);
        }

        let outcome = adapter.verify(reference).await?;
        self.resolve(reference, &outcome).await
    }

    /// Webhook path (asynchronous trigger, signature already verified).
    ///
    /// The payload carries the outcome, so no gateway call is needed. An
    /// unknown reference is synthesized from the payload first - an
    /// idempotent upsert guarded by the reference's unique constraint, so
    /// concurrent duplicate deliveries cannot create two rows.
    pub async fn apply_webhook(
        &self,
        tenant: &Tenant,
        gateway_name: GatewayName,
        fee_cap_minor: i64,
        event: &WebhookEvent,
        raw_body: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let status = match event.event.as_str() {
            "charge.success" => TransactionStatus::Success,
            "charge.failed" => TransactionStatus::Failed,
            other => {
                tracing::debug!("Ignoring webhook event {}", other);
                return Ok(None);
            }
        };

        let data = &event.data;
        {
            let conn = self.db.get()?;
            match queries::get_transaction_by_reference(&conn, &data.reference)? {
                Some(existing) if existing.status.is_terminal() => {
                    return Ok(Some(existing));
                }
                Some(_) => {}
                None => {
                    // The client's own initialize/verify never completed
                    // (e.g. network partition); create the row from the
                    // payload so the outcome still lands durably.
                    let create = synthesize_transaction(tenant, gateway_name, fee_cap_minor, data);
                    if queries::insert_transaction_if_absent(&conn, &create)? {
                        tracing::info!(
                            "Synthesized transaction {} from orphan webhook",
                            data.reference
                        );
                    }
                }
            }
        }

        let outcome = VerifyOutcome {
            status,
            gateway_tx_id: data.id.map(|id| id.to_string()),
            amount_minor: data.amount,
            paid_at: data
                .paid_at
                .as_deref()
                .and_then(crate::gateways::parse_gateway_timestamp),
            raw: serde_json::from_str(raw_body).unwrap_or(Value::Null),
            failure_reason: match status {
                TransactionStatus::Failed => Some(
                    data.gateway_response
                        .clone()
                        .unwrap_or_else(|| "Charge failed".to_string()),
                ),
                _ => None,
            },
        };

        self.resolve(&data.reference, &outcome).await.map(Some)
    }

    /// Shared tail of both paths: run the critical section, then dispatch
    /// the confirmation strictly after the storage transaction committed.
    pub async fn resolve(
        &self,
        reference: &str,
        outcome: &VerifyOutcome,
    ) -> Result<PaymentTransaction> {
        let resolution = {
            let mut conn = self.db.get()?;
            apply_outcome(&mut conn, reference, outcome)?
        };

        if let Some(confirmation) = &resolution.confirmation {
            settlement::dispatch_confirmation(self.notifier.as_ref(), confirmation).await;
        }

        Ok(resolution.transaction)
    }
}

fn synthesize_transaction(
    tenant: &Tenant,
    gateway_name: GatewayName,
    fee_cap_minor: i64,
    data: &WebhookChargeData,
) -> CreateTransaction {
    let amount_minor = data.amount.unwrap_or(0);
    let fee_bps = fees::effective_fee_bps(tenant.plan, tenant.fee_percent_bps);
    let split = fees::compute(amount_minor, fee_bps, fee_cap_minor);

    CreateTransaction {
        tenant_id: tenant.id.clone(),
        transaction_reference: data.reference.clone(),
        amount_minor,
        currency: data.currency.clone().unwrap_or_else(|| "NGN".to_string()),
        platform_fee_minor: split.platform_fee_minor,
        merchant_amount_minor: split.merchant_amount_minor,
        status: TransactionStatus::Pending,
        gateway_name,
        gateway_transaction_id: data.id.map(|id| id.to_string()),
        customer_email: data
            .customer
            .as_ref()
            .and_then(|c| c.email.clone())
            .unwrap_or_default(),
        customer_name: data.customer.as_ref().and_then(|c| c.name.clone()),
        order_id: None,
        invoice_id: None,
        gateway_response: None,
        paid_at: None,
        failure_reason: None,
    }
}

/// Spawns the periodic reconciliation sweep: pending transactions older than
/// the configured age are re-verified through the normal verify path, so a
/// client that never called back cannot strand a paid transaction.
pub fn spawn_pending_sweep(state: AppState, interval_secs: u64, min_age_secs: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);

        loop {
            tokio::time::sleep(interval).await;

            if let Err(e) = sweep_pending(&state, min_age_secs).await {
                tracing::warn!("Pending-transaction sweep failed: {}", e);
            }
        }
    });

    tracing::info!(
        "Reconciliation sweep started (every {}s, min age {}s)",
        interval_secs,
        min_age_secs
    );
}

async fn sweep_pending(state: &AppState, min_age_secs: i64) -> Result<()> {
    let cutoff = Utc::now().timestamp() - min_age_secs;
    let stale = {
        let conn = state.db.get()?;
        queries::list_stale_pending(&conn, cutoff, SWEEP_BATCH)?
    };

    if stale.is_empty() {
        return Ok(());
    }

    tracing::info!("Sweeping {} stale pending transaction(s)", stale.len());
    let engine = ReconciliationEngine::new(state.db.clone(), state.notifier.clone());

    for transaction in stale {
        let gateway = {
            let conn = state.db.get()?;
            queries::get_gateway(&conn, &transaction.tenant_id, transaction.gateway_name)?
        };
        let Some(gateway) = gateway else {
            tracing::warn!(
                "No active {} gateway for tenant {}, skipping {}",
                transaction.gateway_name,
                transaction.tenant_id,
                transaction.transaction_reference
            );
            continue;
        };

        let secret = match gateway.secret_key(&state.master_key) {
            Ok(secret) => secret,
            Err(e) => {
                tracing::error!(
                    "Cannot decrypt gateway secret for tenant {}: {}",
                    transaction.tenant_id,
                    e
                );
                continue;
            }
        };

        let adapter = state.gateways.adapter(&gateway, secret);
        match engine
            .verify(adapter.as_ref(), &transaction.transaction_reference)
            .await
        {
            Ok(resolved) if resolved.status != TransactionStatus::Pending => {
                tracing::info!(
                    "Sweep resolved {} to {}",
                    resolved.transaction_reference,
                    resolved.status
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    "Sweep verify failed for {}: {}",
                    transaction.transaction_reference,
                    e
                );
            }
        }
    }

    Ok(())
}
