use serde::{Deserialize, Serialize};

/// Downstream order a successful transaction settles against.
///
/// Minimal stand-in for the back office's order record: only the fields the
/// settlement path reads or writes are modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub customer_email: String,
    pub total_minor: i64,
    pub currency: String,
    /// "unpaid" until settlement flips it to "paid" exactly once.
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub paid_at: Option<i64>,
    /// Gateway sub-account code for fixed-amount split routing, if the
    /// merchant has one configured.
    pub merchant_subaccount: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Downstream invoice a successful transaction settles against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub tenant_id: String,
    pub customer_email: String,
    pub amount_minor: i64,
    pub currency: String,
    /// "sent" (or "draft") until settlement flips it to "paid" exactly once.
    pub status: String,
    pub payment_reference: Option<String>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
