//! Transaction initiation: create a pending transaction and obtain a
//! checkout target from the tenant's default gateway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::fees::{self, to_major_units, to_minor_units};
use crate::gateways::{ChargeRequest, SplitOptions};
use crate::models::{CreateTransaction, GatewayName, Tenant, TransactionStatus};
use crate::reference;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    /// Major units.
    pub amount: Decimal,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub transaction_reference: String,
    pub authorization_url: String,
    pub gateway: GatewayName,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub merchant_amount: Decimal,
}

/// Create a pending transaction and a gateway checkout for it.
///
/// Returns as soon as the gateway hands back a redirect URL; settlement
/// happens later through the reconciliation engine. If the gateway call
/// fails the pending row stays behind - the sweep will verify it against the
/// gateway and resolve it to failed through the normal path.
pub async fn initiate(
    state: &AppState,
    tenant: &Tenant,
    request: &InitiateRequest,
) -> Result<InitiateResponse> {
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("email is required".into()));
    }
    if request.amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    if request.order_id.is_some() && request.invoice_id.is_some() {
        return Err(AppError::Validation(
            "a transaction settles at most one of order_id or invoice_id".into(),
        ));
    }

    let amount_minor = to_minor_units(request.amount)?;
    let currency = request.currency.clone().unwrap_or_else(|| "NGN".to_string());

    let conn = state.db.get()?;

    let gateway = queries::get_default_gateway(&conn, &tenant.id)?.ok_or_else(|| {
        AppError::Configuration("No active default payment gateway configured".into())
    })?;

    // Cross-check the settlement target and pick up the merchant's
    // sub-account for split routing.
    let mut merchant_subaccount = None;
    if let Some(order_id) = &request.order_id {
        let order = queries::get_order_by_id(&conn, order_id)?.or_not_found("Order")?;
        if order.tenant_id != tenant.id {
            return Err(AppError::NotFound("Order".into()));
        }
        merchant_subaccount = order.merchant_subaccount;
    }
    if let Some(invoice_id) = &request.invoice_id {
        let invoice = queries::get_invoice_by_id(&conn, invoice_id)?.or_not_found("Invoice")?;
        if invoice.tenant_id != tenant.id {
            return Err(AppError::NotFound("Invoice".into()));
        }
    }

    let fee_bps = fees::effective_fee_bps(tenant.plan, tenant.fee_percent_bps);
    let split = fees::compute(amount_minor, fee_bps, state.fee_cap_minor);

    let transaction_reference = reference::generate();
    queries::create_transaction(
        &conn,
        &CreateTransaction {
            tenant_id: tenant.id.clone(),
            transaction_reference: transaction_reference.clone(),
            amount_minor,
            currency: currency.clone(),
            platform_fee_minor: split.platform_fee_minor,
            merchant_amount_minor: split.merchant_amount_minor,
            status: TransactionStatus::Pending,
            gateway_name: gateway.gateway_name,
            gateway_transaction_id: None,
            customer_email: request.email.clone(),
            customer_name: request.name.clone(),
            order_id: request.order_id.clone(),
            invoice_id: request.invoice_id.clone(),
            gateway_response: None,
            paid_at: None,
            failure_reason: None,
        },
    )?;

    let secret = gateway.secret_key(&state.master_key)?;
    let adapter = state.gateways.adapter(&gateway, secret);

    // tenant_id rides in the metadata so webhooks can be attributed even if
    // the reference is unknown to us when they arrive.
    let mut metadata = serde_json::json!({ "tenant_id": tenant.id });
    if let Some(custom) = &request.metadata {
        metadata["custom"] = custom.clone();
    }

    // Default callback lands the customer on the public verify endpoint, so
    // the redirect itself becomes the synchronous reconciliation trigger.
    let callback_url = request.callback_url.clone().unwrap_or_else(|| {
        format!(
            "{}/payments/verify?reference={}&tenant_id={}",
            state.base_url, transaction_reference, tenant.id
        )
    });

    let charge = ChargeRequest {
        reference: transaction_reference.clone(),
        amount_minor,
        currency,
        email: request.email.clone(),
        customer_name: request.name.clone(),
        callback_url: Some(callback_url),
        metadata,
        split: merchant_subaccount.map(|subaccount| SplitOptions {
            subaccount,
            platform_fee_minor: split.platform_fee_minor,
        }),
    };

    // Gateway call runs outside any storage transaction; only the back-fill
    // below touches the row again.
    let initialized = adapter.initialize(&charge).await?;

    queries::set_gateway_details(
        &conn,
        &transaction_reference,
        initialized.gateway_tx_id.as_deref(),
        &serde_json::to_string(&initialized.raw)?,
    )?;

    tracing::info!(
        "Initiated {} via {} for tenant {}",
        transaction_reference,
        gateway.gateway_name,
        tenant.id
    );

    Ok(InitiateResponse {
        transaction_reference,
        authorization_url: initialized.authorization_url,
        gateway: gateway.gateway_name,
        amount: to_major_units(amount_minor),
        platform_fee: to_major_units(split.platform_fee_minor),
        merchant_amount: to_major_units(split.merchant_amount_minor),
    })
}
