use serde::{Deserialize, Serialize};

use crate::crypto::MasterKey;
use crate::error::{AppError, Result};

/// Supported payment gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayName {
    Paystack,
    Flutterwave,
}

impl GatewayName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paystack => "paystack",
            Self::Flutterwave => "flutterwave",
        }
    }

    /// Header carrying the hex HMAC-SHA512 webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            Self::Paystack => "x-paystack-signature",
            Self::Flutterwave => "x-flutterwave-signature",
        }
    }
}

impl std::str::FromStr for GatewayName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paystack" => Ok(Self::Paystack),
            "flutterwave" => Ok(Self::Flutterwave),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for GatewayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tenant's configured payment gateway.
///
/// At most one gateway per tenant is the default at any time; the store
/// enforces this with a partial unique index and an atomic swap on update.
#[derive(Debug, Clone)]
pub struct PaymentGateway {
    pub id: String,
    pub tenant_id: String,
    pub gateway_name: GatewayName,
    /// Envelope-encrypted secret key (see `crypto::MasterKey`).
    pub secret_key_encrypted: Vec<u8>,
    pub public_key: String,
    pub test_mode: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PaymentGateway {
    /// Decrypt the stored secret key for API calls and webhook verification.
    pub fn secret_key(&self, master_key: &MasterKey) -> Result<String> {
        let plaintext = master_key.decrypt_secret(&self.tenant_id, &self.secret_key_encrypted)?;
        String::from_utf8(plaintext)
            .map_err(|_| AppError::Internal("Gateway secret key is not valid UTF-8".into()))
    }
}

/// Data required to configure (or reconfigure) a tenant gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertGateway {
    pub gateway_name: GatewayName,
    pub secret_key: String,
    pub public_key: String,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool {
    true
}
