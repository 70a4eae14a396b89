use serde::{Deserialize, Serialize};

use super::GatewayName;

/// Durable record of a single charge attempt against a gateway.
///
/// `transaction_reference` is the sole idempotency key: it is generated once
/// by the initiator, never changes, and everything the reconciliation engine
/// does is keyed on it. Rows are never deleted (audit trail).
///
/// All amounts are in minor currency units (kobo, cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub tenant_id: String,
    pub transaction_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub platform_fee_minor: i64,
    pub merchant_amount_minor: i64,
    pub status: TransactionStatus,
    pub gateway_name: GatewayName,
    pub gateway_transaction_id: Option<String>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    /// At most one of `order_id` / `invoice_id` is set (settlement target).
    pub order_id: Option<String>,
    pub invoice_id: Option<String>,
    /// Raw last gateway response, opaque JSON text.
    pub gateway_response: Option<String>,
    pub paid_at: Option<i64>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Transaction lifecycle state.
///
/// Allowed transitions: pending -> success, pending -> failed, and
/// failed -> success (gateways may report a late success after an earlier
/// failed poll). Success is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data required to create a new pending transaction.
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub tenant_id: String,
    pub transaction_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub platform_fee_minor: i64,
    pub merchant_amount_minor: i64,
    pub status: TransactionStatus,
    pub gateway_name: GatewayName,
    pub gateway_transaction_id: Option<String>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub order_id: Option<String>,
    pub invoice_id: Option<String>,
    pub gateway_response: Option<String>,
    pub paid_at: Option<i64>,
    pub failure_reason: Option<String>,
}
