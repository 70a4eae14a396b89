use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::crypto::{hash_secret, MasterKey};
use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    query_all, query_one, GATEWAY_COLS, INVOICE_COLS, ORDER_COLS, TENANT_COLS, TRANSACTION_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Tenants ============

pub fn create_tenant(conn: &Connection, input: &CreateTenant, api_key: &str) -> Result<Tenant> {
    let id = gen_id();
    let now = now();
    let fee_bps = input.fee_percent_bps.unwrap_or(crate::fees::DEFAULT_FEE_BPS);

    conn.execute(
        "INSERT INTO tenants (id, name, plan, fee_percent_bps, api_key_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![&id, &input.name, input.plan.as_str(), fee_bps, hash_secret(api_key), now],
    )?;

    Ok(Tenant {
        id,
        name: input.name.clone(),
        plan: input.plan,
        fee_percent_bps: fee_bps,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_tenant_by_id(conn: &Connection, id: &str) -> Result<Option<Tenant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tenants WHERE id = ?1", TENANT_COLS),
        &[&id],
    )
}

pub fn get_tenant_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<Tenant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tenants WHERE api_key_hash = ?1", TENANT_COLS),
        &[&hash_secret(api_key)],
    )
}

/// Generate a new tenant API key (shown once at creation time).
pub fn generate_api_key() -> String {
    format!("pd_{}", Uuid::new_v4().as_simple())
}

// ============ Payment Gateways ============

/// Create or replace a tenant's gateway configuration.
///
/// The secret key is envelope-encrypted before storage. When `is_default` is
/// set, any previous default is cleared in the same storage transaction so
/// the "exactly one default" invariant holds at every commit point.
pub fn upsert_gateway(
    conn: &mut Connection,
    tenant_id: &str,
    input: &UpsertGateway,
    master_key: &MasterKey,
) -> Result<PaymentGateway> {
    let encrypted = master_key.encrypt_secret(tenant_id, input.secret_key.as_bytes())?;
    let now = now();
    let id = gen_id();

    let tx = conn.transaction()?;

    if input.is_default {
        tx.execute(
            "UPDATE payment_gateways SET is_default = 0, updated_at = ?1
             WHERE tenant_id = ?2 AND is_default = 1",
            params![now, tenant_id],
        )?;
    }

    tx.execute(
        "INSERT INTO payment_gateways
            (id, tenant_id, gateway_name, secret_key, public_key, test_mode, is_active, is_default, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(tenant_id, gateway_name) DO UPDATE SET
            secret_key = excluded.secret_key,
            public_key = excluded.public_key,
            test_mode = excluded.test_mode,
            is_active = excluded.is_active,
            is_default = excluded.is_default,
            updated_at = excluded.updated_at",
        params![
            &id,
            tenant_id,
            input.gateway_name.as_str(),
            &encrypted,
            &input.public_key,
            input.test_mode as i32,
            input.is_active as i32,
            input.is_default as i32,
            now,
        ],
    )?;

    let gateway = query_one(
        &tx,
        &format!(
            "SELECT {} FROM payment_gateways WHERE tenant_id = ?1 AND gateway_name = ?2",
            GATEWAY_COLS
        ),
        &[&tenant_id, &input.gateway_name.as_str()],
    )?
    .ok_or_else(|| AppError::Internal("Gateway row missing after upsert".into()))?;

    tx.commit()?;
    Ok(gateway)
}

/// The tenant's single active default gateway, if any.
pub fn get_default_gateway(conn: &Connection, tenant_id: &str) -> Result<Option<PaymentGateway>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_gateways
             WHERE tenant_id = ?1 AND is_default = 1 AND is_active = 1",
            GATEWAY_COLS
        ),
        &[&tenant_id],
    )
}

pub fn get_gateway(
    conn: &Connection,
    tenant_id: &str,
    name: GatewayName,
) -> Result<Option<PaymentGateway>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_gateways
             WHERE tenant_id = ?1 AND gateway_name = ?2 AND is_active = 1",
            GATEWAY_COLS
        ),
        &[&tenant_id, &name.as_str()],
    )
}

pub fn list_gateways(conn: &Connection, tenant_id: &str) -> Result<Vec<PaymentGateway>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_gateways WHERE tenant_id = ?1 ORDER BY created_at",
            GATEWAY_COLS
        ),
        &[&tenant_id],
    )
}

// ============ Payment Transactions ============

pub fn create_transaction(
    conn: &Connection,
    input: &CreateTransaction,
) -> Result<PaymentTransaction> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payment_transactions
            (id, tenant_id, transaction_reference, amount_minor, currency,
             platform_fee_minor, merchant_amount_minor, status, gateway_name,
             gateway_transaction_id, customer_email, customer_name, order_id,
             invoice_id, gateway_response, paid_at, failure_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
        params![
            &id,
            &input.tenant_id,
            &input.transaction_reference,
            input.amount_minor,
            &input.currency,
            input.platform_fee_minor,
            input.merchant_amount_minor,
            input.status.as_str(),
            input.gateway_name.as_str(),
            &input.gateway_transaction_id,
            &input.customer_email,
            &input.customer_name,
            &input.order_id,
            &input.invoice_id,
            &input.gateway_response,
            input.paid_at,
            &input.failure_reason,
            now,
        ],
    )?;

    Ok(PaymentTransaction {
        id,
        tenant_id: input.tenant_id.clone(),
        transaction_reference: input.transaction_reference.clone(),
        amount_minor: input.amount_minor,
        currency: input.currency.clone(),
        platform_fee_minor: input.platform_fee_minor,
        merchant_amount_minor: input.merchant_amount_minor,
        status: input.status,
        gateway_name: input.gateway_name,
        gateway_transaction_id: input.gateway_transaction_id.clone(),
        customer_email: input.customer_email.clone(),
        customer_name: input.customer_name.clone(),
        order_id: input.order_id.clone(),
        invoice_id: input.invoice_id.clone(),
        gateway_response: input.gateway_response.clone(),
        paid_at: input.paid_at,
        failure_reason: input.failure_reason.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Insert a transaction unless one with the same reference already exists.
///
/// Uses INSERT OR IGNORE against the UNIQUE(transaction_reference) constraint
/// so concurrent duplicate webhook deliveries for an unknown reference create
/// exactly one row. Returns true if this call inserted the row.
pub fn insert_transaction_if_absent(
    conn: &Connection,
    input: &CreateTransaction,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO payment_transactions
            (id, tenant_id, transaction_reference, amount_minor, currency,
             platform_fee_minor, merchant_amount_minor, status, gateway_name,
             gateway_transaction_id, customer_email, customer_name, order_id,
             invoice_id, gateway_response, paid_at, failure_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
        params![
            &gen_id(),
            &input.tenant_id,
            &input.transaction_reference,
            input.amount_minor,
            &input.currency,
            input.platform_fee_minor,
            input.merchant_amount_minor,
            input.status.as_str(),
            input.gateway_name.as_str(),
            &input.gateway_transaction_id,
            &input.customer_email,
            &input.customer_name,
            &input.order_id,
            &input.invoice_id,
            &input.gateway_response,
            input.paid_at,
            &input.failure_reason,
            now(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_transaction_by_reference(
    conn: &Connection,
    reference: &str,
) -> Result<Option<PaymentTransaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_transactions WHERE transaction_reference = ?1",
            TRANSACTION_COLS
        ),
        &[&reference],
    )
}

/// Back-fill gateway details after a successful initialize call.
pub fn set_gateway_details(
    conn: &Connection,
    reference: &str,
    gateway_transaction_id: Option<&str>,
    gateway_response: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payment_transactions
         SET gateway_transaction_id = ?1, gateway_response = ?2, updated_at = ?3
         WHERE transaction_reference = ?4",
        params![gateway_transaction_id, gateway_response, now(), reference],
    )?;
    Ok(())
}

/// Compare-and-swap a transaction to a terminal status.
///
/// The `status != 'success'` guard is the single enforcement point for the
/// state machine: pending -> success/failed and failed -> success all pass,
/// while anything touching an already-successful row is a no-op. Returns
/// whether this call changed the row.
pub fn try_resolve_transaction(
    conn: &Connection,
    reference: &str,
    status: TransactionStatus,
    gateway_transaction_id: Option<&str>,
    gateway_response: Option<&str>,
    paid_at: Option<i64>,
    failure_reason: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_transactions
         SET status = ?1,
             gateway_transaction_id = COALESCE(?2, gateway_transaction_id),
             gateway_response = COALESCE(?3, gateway_response),
             paid_at = COALESCE(?4, paid_at),
             failure_reason = ?5,
             updated_at = ?6
         WHERE transaction_reference = ?7 AND status != 'success'",
        params![
            status.as_str(),
            gateway_transaction_id,
            gateway_response,
            paid_at,
            failure_reason,
            now(),
            reference,
        ],
    )?;
    Ok(affected > 0)
}

pub fn list_transactions(
    conn: &Connection,
    tenant_id: &str,
    limit: i64,
) -> Result<Vec<PaymentTransaction>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_transactions
             WHERE tenant_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            TRANSACTION_COLS
        ),
        &[&tenant_id, &limit],
    )
}

/// Pending transactions older than the cutoff, for the reconciliation sweep.
pub fn list_stale_pending(
    conn: &Connection,
    older_than: i64,
    limit: i64,
) -> Result<Vec<PaymentTransaction>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_transactions
             WHERE status = 'pending' AND created_at < ?1
             ORDER BY created_at LIMIT ?2",
            TRANSACTION_COLS
        ),
        &[&older_than, &limit],
    )
}

// ============ Orders & Invoices ============

pub fn create_order(
    conn: &Connection,
    tenant_id: &str,
    customer_email: &str,
    total_minor: i64,
    currency: &str,
    merchant_subaccount: Option<&str>,
) -> Result<Order> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO orders
            (id, tenant_id, customer_email, total_minor, currency, payment_status,
             merchant_subaccount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'unpaid', ?6, ?7, ?7)",
        params![&id, tenant_id, customer_email, total_minor, currency, merchant_subaccount, now],
    )?;

    Ok(Order {
        id,
        tenant_id: tenant_id.to_string(),
        customer_email: customer_email.to_string(),
        total_minor,
        currency: currency.to_string(),
        payment_status: "unpaid".to_string(),
        payment_reference: None,
        paid_at: None,
        merchant_subaccount: merchant_subaccount.map(|s| s.to_string()),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn create_invoice(
    conn: &Connection,
    tenant_id: &str,
    customer_email: &str,
    amount_minor: i64,
    currency: &str,
) -> Result<Invoice> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO invoices
            (id, tenant_id, customer_email, amount_minor, currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'sent', ?6, ?6)",
        params![&id, tenant_id, customer_email, amount_minor, currency, now],
    )?;

    Ok(Invoice {
        id,
        tenant_id: tenant_id.to_string(),
        customer_email: customer_email.to_string(),
        amount_minor,
        currency: currency.to_string(),
        status: "sent".to_string(),
        payment_reference: None,
        paid_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_invoice_by_id(conn: &Connection, id: &str) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLS),
        &[&id],
    )
}

/// Atomically mark an order as paid, returning whether this call changed it.
///
/// The `payment_status != 'paid'` guard makes settlement exactly-once even if
/// two resolutions ever reached this point: only one UPDATE reports an
/// affected row, and only that caller sends the confirmation notification.
pub fn try_settle_order(
    conn: &Connection,
    order_id: &str,
    reference: &str,
    paid_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders
         SET payment_status = 'paid', payment_reference = ?1, paid_at = ?2, updated_at = ?3
         WHERE id = ?4 AND payment_status != 'paid'",
        params![reference, paid_at, now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Atomically mark an invoice as paid; same semantics as `try_settle_order`.
pub fn try_settle_invoice(
    conn: &Connection,
    invoice_id: &str,
    reference: &str,
    paid_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE invoices
         SET status = 'paid', payment_reference = ?1, paid_at = ?2, updated_at = ?3
         WHERE id = ?4 AND status != 'paid'",
        params![reference, paid_at, now(), invoice_id],
    )?;
    Ok(affected > 0)
}
