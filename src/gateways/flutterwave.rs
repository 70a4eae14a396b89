//! Flutterwave adapter.
//!
//! Flutterwave bills in major units, so amounts cross an explicit
//! minor-to-major conversion on the way out and major-to-minor on the way
//! back in (see `fees::to_major_units` / `fees::to_minor_units`).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::fees::{to_major_units, to_minor_units};
use crate::models::{GatewayName, TransactionStatus};

use super::{
    http_client, parse_gateway_timestamp, ChargeRequest, GatewayAdapter, InitializedCharge,
    VerifyOutcome,
};

const API_BASE: &str = "https://api.flutterwave.com/v3";

#[derive(Debug, Serialize)]
struct PaymentRequest<'a> {
    tx_ref: &'a str,
    /// Major units.
    amount: Decimal,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<&'a str>,
    customer: Customer<'a>,
    meta: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    subaccounts: Option<Vec<Subaccount<'a>>>,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Subaccount<'a> {
    id: &'a str,
    /// "flat" routes a fixed amount to the platform; a percentage type
    /// would not respect the fee cap.
    transaction_charge_type: &'static str,
    /// Major units.
    transaction_charge: Decimal,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    status: String,
    message: String,
    data: Option<PaymentData>,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    message: String,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: Option<i64>,
    status: String,
    /// Major units.
    amount: Option<Decimal>,
    created_at: Option<String>,
    processor_response: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlutterwaveAdapter {
    client: reqwest::Client,
    secret_key: String,
}

impl FlutterwaveAdapter {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: http_client(),
            secret_key,
        }
    }
}

#[async_trait]
impl GatewayAdapter for FlutterwaveAdapter {
    fn name(&self) -> GatewayName {
        GatewayName::Flutterwave
    }

    async fn initialize(&self, charge: &ChargeRequest) -> Result<InitializedCharge> {
        let subaccounts = charge.split.as_ref().map(|split| {
            vec![Subaccount {
                id: split.subaccount.as_str(),
                transaction_charge_type: "flat",
                transaction_charge: to_major_units(split.platform_fee_minor),
            }]
        });

        let body = PaymentRequest {
            tx_ref: &charge.reference,
            amount: to_major_units(charge.amount_minor),
            currency: &charge.currency,
            redirect_url: charge.callback_url.as_deref(),
            customer: Customer {
                email: &charge.email,
                name: charge.customer_name.as_deref(),
            },
            meta: &charge.metadata,
            subaccounts,
        };

        let response = self
            .client
            .post(format!("{}/payments", API_BASE))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Flutterwave initialize failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Flutterwave initialize rejected: {}",
                error_text
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Invalid Flutterwave response: {}", e)))?;
        let parsed: PaymentResponse = serde_json::from_value(raw.clone())?;

        let data = match (parsed.status.as_str(), parsed.data) {
            ("success", Some(data)) => data,
            _ => {
                return Err(AppError::Gateway(format!(
                    "Flutterwave initialize rejected: {}",
                    parsed.message
                )))
            }
        };

        Ok(InitializedCharge {
            authorization_url: data.link,
            // Flutterwave assigns its transaction id at charge time, not at
            // initialize; it is back-filled by verify.
            gateway_tx_id: None,
            raw,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifyOutcome> {
        let response = self
            .client
            .get(format!("{}/transactions/{}/verify", API_BASE, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Flutterwave verify failed: {}", e)))?;

        let raw: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                return Ok(VerifyOutcome::failed(
                    format!("Unparseable Flutterwave verify response: {}", e),
                    Value::Null,
                ))
            }
        };

        let parsed: VerifyResponse = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                return Ok(VerifyOutcome::failed(
                    format!("Unexpected Flutterwave verify shape: {}", e),
                    raw,
                ))
            }
        };

        let data = match (parsed.status.as_str(), parsed.data) {
            ("success", Some(data)) => data,
            _ => return Ok(VerifyOutcome::failed(parsed.message, raw)),
        };

        let amount_minor = data.amount.and_then(|major| to_minor_units(major).ok());

        if data.status == "successful" {
            Ok(VerifyOutcome {
                status: TransactionStatus::Success,
                gateway_tx_id: data.id.map(|id| id.to_string()),
                amount_minor,
                paid_at: data.created_at.as_deref().and_then(parse_gateway_timestamp),
                raw,
                failure_reason: None,
            })
        } else {
            let reason = data
                .processor_response
                .unwrap_or_else(|| format!("Charge {}", data.status));
            Ok(VerifyOutcome {
                status: TransactionStatus::Failed,
                gateway_tx_id: data.id.map(|id| id.to_string()),
                amount_minor,
                paid_at: None,
                raw,
                failure_reason: Some(reason),
            })
        }
    }
}
