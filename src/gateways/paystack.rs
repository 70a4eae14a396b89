//! Paystack adapter.
//!
//! Paystack bills in minor units (kobo), which is also how amounts are stored
//! internally, so no conversion happens on this side of the boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{GatewayName, TransactionStatus};

use super::{
    http_client, parse_gateway_timestamp, ChargeRequest, GatewayAdapter, InitializedCharge,
    VerifyOutcome,
};

const API_BASE: &str = "https://api.paystack.co";

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    /// Minor units (kobo).
    amount: i64,
    reference: &'a str,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a Value,
    /// Sub-account to route the merchant share to (split payments).
    #[serde(skip_serializing_if = "Option::is_none")]
    subaccount: Option<&'a str>,
    /// Flat platform cut in minor units. Fixed amount, not a percentage,
    /// so the fee cap is respected.
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_charge: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearer: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    status: bool,
    message: String,
    data: Option<InitializeData>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    message: String,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: Option<i64>,
    status: String,
    /// Minor units.
    amount: Option<i64>,
    paid_at: Option<String>,
    gateway_response: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaystackAdapter {
    client: reqwest::Client,
    secret_key: String,
}

impl PaystackAdapter {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: http_client(),
            secret_key,
        }
    }
}

#[async_trait]
impl GatewayAdapter for PaystackAdapter {
    fn name(&self) -> GatewayName {
        GatewayName::Paystack
    }

    async fn initialize(&self, charge: &ChargeRequest) -> Result<InitializedCharge> {
        let body = InitializeRequest {
            email: &charge.email,
            amount: charge.amount_minor,
            reference: &charge.reference,
            currency: &charge.currency,
            callback_url: charge.callback_url.as_deref(),
            metadata: &charge.metadata,
            subaccount: charge.split.as_ref().map(|s| s.subaccount.as_str()),
            transaction_charge: charge.split.as_ref().map(|s| s.platform_fee_minor),
            bearer: charge.split.as_ref().map(|_| "subaccount"),
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", API_BASE))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Paystack initialize failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Paystack initialize rejected: {}",
                error_text
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Invalid Paystack response: {}", e)))?;
        let parsed: InitializeResponse = serde_json::from_value(raw.clone())?;

        let data = match (parsed.status, parsed.data) {
            (true, Some(data)) => data,
            _ => {
                return Err(AppError::Gateway(format!(
                    "Paystack initialize rejected: {}",
                    parsed.message
                )))
            }
        };

        Ok(InitializedCharge {
            authorization_url: data.authorization_url,
            gateway_tx_id: Some(data.access_code),
            raw,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifyOutcome> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", API_BASE, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Paystack verify failed: {}", e)))?;

        // Anything the gateway actually answered with maps to an outcome;
        // "not found" and "not yet paid" are valid failed results.
        let raw: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                return Ok(VerifyOutcome::failed(
                    format!("Unparseable Paystack verify response: {}", e),
                    Value::Null,
                ))
            }
        };

        let parsed: VerifyResponse = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                return Ok(VerifyOutcome::failed(
                    format!("Unexpected Paystack verify shape: {}", e),
                    raw,
                ))
            }
        };

        let data = match (parsed.status, parsed.data) {
            (true, Some(data)) => data,
            _ => return Ok(VerifyOutcome::failed(parsed.message, raw)),
        };

        if data.status == "success" {
            Ok(VerifyOutcome {
                status: TransactionStatus::Success,
                gateway_tx_id: data.id.map(|id| id.to_string()),
                amount_minor: data.amount,
                paid_at: data.paid_at.as_deref().and_then(parse_gateway_timestamp),
                raw,
                failure_reason: None,
            })
        } else {
            let reason = data
                .gateway_response
                .unwrap_or_else(|| format!("Charge {}", data.status));
            Ok(VerifyOutcome {
                status: TransactionStatus::Failed,
                gateway_tx_id: data.id.map(|id| id.to_string()),
                amount_minor: data.amount,
                paid_at: None,
                raw,
                failure_reason: Some(reason),
            })
        }
    }
}
