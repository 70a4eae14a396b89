//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when the
/// database contains invalid enum values (corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const TENANT_COLS: &str = "id, name, plan, fee_percent_bps, created_at, updated_at";

pub const GATEWAY_COLS: &str = "id, tenant_id, gateway_name, secret_key, public_key, test_mode, is_active, is_default, created_at, updated_at";

pub const TRANSACTION_COLS: &str = "id, tenant_id, transaction_reference, amount_minor, currency, platform_fee_minor, merchant_amount_minor, status, gateway_name, gateway_transaction_id, customer_email, customer_name, order_id, invoice_id, gateway_response, paid_at, failure_reason, created_at, updated_at";

pub const ORDER_COLS: &str = "id, tenant_id, customer_email, total_minor, currency, payment_status, payment_reference, paid_at, merchant_subaccount, created_at, updated_at";

pub const INVOICE_COLS: &str = "id, tenant_id, customer_email, amount_minor, currency, status, payment_reference, paid_at, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Tenant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Tenant {
            id: row.get(0)?,
            name: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            fee_percent_bps: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for PaymentGateway {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentGateway {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            gateway_name: parse_enum(row, 2, "gateway_name")?,
            secret_key_encrypted: row.get(3)?,
            public_key: row.get(4)?,
            test_mode: row.get::<_, i32>(5)? != 0,
            is_active: row.get::<_, i32>(6)? != 0,
            is_default: row.get::<_, i32>(7)? != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for PaymentTransaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentTransaction {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            transaction_reference: row.get(2)?,
            amount_minor: row.get(3)?,
            currency: row.get(4)?,
            platform_fee_minor: row.get(5)?,
            merchant_amount_minor: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            gateway_name: parse_enum(row, 8, "gateway_name")?,
            gateway_transaction_id: row.get(9)?,
            customer_email: row.get(10)?,
            customer_name: row.get(11)?,
            order_id: row.get(12)?,
            invoice_id: row.get(13)?,
            gateway_response: row.get(14)?,
            paid_at: row.get(15)?,
            failure_reason: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            customer_email: row.get(2)?,
            total_minor: row.get(3)?,
            currency: row.get(4)?,
            payment_status: row.get(5)?,
            payment_reference: row.get(6)?,
            paid_at: row.get(7)?,
            merchant_subaccount: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for Invoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            customer_email: row.get(2)?,
            amount_minor: row.get(3)?,
            currency: row.get(4)?,
            status: row.get(5)?,
            payment_reference: row.get(6)?,
            paid_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}
