//! Gateway adapters.
//!
//! A capability interface over the two supported gateways. Variants are
//! selected once at construction time (via `GatewayFactory`), never by
//! string-matching at call sites.

mod flutterwave;
mod paystack;

pub use flutterwave::FlutterwaveAdapter;
pub use paystack::PaystackAdapter;

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::Result;
use crate::models::{GatewayName, PaymentGateway, TransactionStatus};

/// Timeout for all gateway HTTP calls. Row locks are never held across these.
const GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Fixed-amount split routing for gateways with merchant sub-accounts.
///
/// The platform's cut is the already-capped fee as an absolute minor-unit
/// amount; percentage-based splits would not respect the cap.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub subaccount: String,
    pub platform_fee_minor: i64,
}

/// Everything a gateway needs to set up a checkout.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub customer_name: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
    pub split: Option<SplitOptions>,
}

/// Result of a successful initialize call.
#[derive(Debug, Clone)]
pub struct InitializedCharge {
    pub authorization_url: String,
    pub gateway_tx_id: Option<String>,
    pub raw: serde_json::Value,
}

/// Normalized result of a verify call.
///
/// A gateway reporting "not paid" / "failed" / "abandoned" is a valid
/// outcome, not an error, so the reconciliation engine can persist it.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    /// Success or Failed, never Pending.
    pub status: TransactionStatus,
    pub gateway_tx_id: Option<String>,
    pub amount_minor: Option<i64>,
    pub paid_at: Option<i64>,
    pub raw: serde_json::Value,
    pub failure_reason: Option<String>,
}

impl VerifyOutcome {
    pub fn failed(reason: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            status: TransactionStatus::Failed,
            gateway_tx_id: None,
            amount_minor: None,
            paid_at: None,
            raw,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Capability interface normalizing the two gateway implementations.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn name(&self) -> GatewayName;

    /// Set up a checkout; the customer completes payment at the returned URL.
    /// Failures surface as `AppError::Gateway`.
    async fn initialize(&self, charge: &ChargeRequest) -> Result<InitializedCharge>;

    /// Ask the gateway for the current outcome of a charge.
    ///
    /// Only transport-level failures (timeout, connection) return `Err`;
    /// every response the gateway actually produced maps to an outcome.
    async fn verify(&self, reference: &str) -> Result<VerifyOutcome>;
}

/// Constructs adapters from stored gateway configurations.
///
/// Injected into `AppState` so tests can substitute scripted fakes for the
/// live HTTP clients.
pub trait GatewayFactory: Send + Sync {
    fn adapter(&self, gateway: &PaymentGateway, secret_key: String) -> Box<dyn GatewayAdapter>;
}

/// Production factory backed by the real HTTP adapters.
pub struct LiveGatewayFactory;

impl GatewayFactory for LiveGatewayFactory {
    fn adapter(&self, gateway: &PaymentGateway, secret_key: String) -> Box<dyn GatewayAdapter> {
        match gateway.gateway_name {
            GatewayName::Paystack => Box::new(PaystackAdapter::new(secret_key)),
            GatewayName::Flutterwave => Box::new(FlutterwaveAdapter::new(secret_key)),
        }
    }
}

/// Verify an inbound webhook: hex HMAC-SHA512 of the exact raw request body.
///
/// The MAC must be computed over the bytes as received - re-serializing the
/// JSON can alter key order and whitespace and silently break verification.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    type HmacSha512 = Hmac<Sha512>;

    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Use constant-time comparison to prevent timing attacks.
    // Length check is not constant-time, but signature length is not secret
    // (always 128 hex chars for SHA-512).
    let expected_bytes = expected.as_bytes();
    let provided_bytes = signature.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

/// Shared HTTP client with the gateway timeout applied.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
}

/// Parse a gateway RFC3339 timestamp (e.g. "2024-03-01T10:15:00.000Z").
pub(crate) fn parse_gateway_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp())
}
