use axum::extract::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Query, TenantAuth};
use crate::fees::to_major_units;
use crate::initiate::{self, InitiateRequest, InitiateResponse};
use crate::models::{GatewayName, PaymentTransaction, TransactionStatus};
use crate::reconcile::ReconciliationEngine;

/// POST /payments/initialize (authenticated)
pub async fn initialize_payment(
    State(state): State<AppState>,
    TenantAuth(tenant): TenantAuth,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>> {
    let response = initiate::initiate(&state, &tenant, &request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub data: VerifyData,
}

#[derive(Debug, Serialize)]
pub struct VerifyData {
    pub transaction: TransactionView,
}

/// Client-facing transaction shape: amounts in major units.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: String,
    pub reference: String,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub merchant_amount: Decimal,
    pub currency: String,
    pub gateway: GatewayName,
    pub paid_at: Option<i64>,
    pub failure_reason: Option<String>,
}

impl From<&PaymentTransaction> for TransactionView {
    fn from(t: &PaymentTransaction) -> Self {
        Self {
            id: t.id.clone(),
            reference: t.transaction_reference.clone(),
            status: t.status,
            amount: to_major_units(t.amount_minor),
            platform_fee: to_major_units(t.platform_fee_minor),
            merchant_amount: to_major_units(t.merchant_amount_minor),
            currency: t.currency.clone(),
            gateway: t.gateway_name,
            paid_at: t.paid_at,
            failure_reason: t.failure_reason.clone(),
        }
    }
}

/// GET /payments/verify?reference=…&tenant_id=… (public)
///
/// The synchronous reconciliation trigger: polls the gateway for the
/// transaction's outcome and resolves it, idempotently.
pub async fn verify_payment(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>> {
    let (tenant, transaction) = {
        let conn = state.db.get()?;
        let tenant = queries::get_tenant_by_id(&conn, &query.tenant_id)?.or_not_found("Tenant")?;
        let transaction = queries::get_transaction_by_reference(&conn, &query.reference)?
            .or_not_found("Transaction")?;
        (tenant, transaction)
    };

    if transaction.tenant_id != tenant.id {
        return Err(AppError::NotFound("Transaction".into()));
    }

    // Verify against the gateway the charge was initiated on; a tenant
    // switching defaults mid-flight must not break in-flight references.
    let resolved = if transaction.status.is_terminal() {
        transaction
    } else {
        let gateway = {
            let conn = state.db.get()?;
            queries::get_gateway(&conn, &tenant.id, transaction.gateway_name)?
        }
        .ok_or_else(|| {
            AppError::Configuration(format!(
                "No active {} gateway configured",
                transaction.gateway_name
            ))
        })?;

        let secret = gateway.secret_key(&state.master_key)?;
        let adapter = state.gateways.adapter(&gateway, secret);
        let engine = ReconciliationEngine::new(state.db.clone(), state.notifier.clone());
        engine.verify(adapter.as_ref(), &query.reference).await?
    };

    let success = resolved.status == TransactionStatus::Success;
    Ok(Json(VerifyResponse {
        success,
        message: match resolved.status {
            TransactionStatus::Success => "Payment verified".to_string(),
            TransactionStatus::Failed => "Payment failed".to_string(),
            TransactionStatus::Pending => "Payment still pending".to_string(),
        },
        data: VerifyData {
            transaction: TransactionView::from(&resolved),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /payments/transactions (authenticated, tenant-scoped)
pub async fn list_transactions(
    State(state): State<AppState>,
    TenantAuth(tenant): TenantAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TransactionView>>> {
    let conn = state.db.get()?;
    let transactions = queries::list_transactions(&conn, &tenant.id, query.limit.clamp(1, 500))?;
    Ok(Json(transactions.iter().map(TransactionView::from).collect()))
}
