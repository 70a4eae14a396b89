//! Payment confirmation notifications.
//!
//! The notifier is an external collaborator from the reconciliation engine's
//! point of view: it is invoked only after the settlement transaction has
//! committed, and its failures are logged and swallowed - a dead mail
//! transport must never block or reverse payment-state persistence.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::fees::to_major_units;
use crate::models::PaymentTransaction;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// What a confirmation email says about a settled payment.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub to_email: String,
    pub customer_name: Option<String>,
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    /// "order" or "invoice"
    pub target_kind: &'static str,
    pub target_id: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_payment_confirmation(&self, confirmation: &PaymentConfirmation) -> Result<()>;
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: String,
}

/// Resend-backed notifier. Without an API key it runs in disabled mode:
/// confirmations are logged, not sent.
pub struct EmailNotifier {
    client: Client,
    api_key: Option<String>,
    from: String,
}

impl EmailNotifier {
    pub fn new(api_key: Option<String>, from: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from,
        }
    }

    fn compose(&self, confirmation: &PaymentConfirmation) -> (String, String) {
        let amount = to_major_units(confirmation.amount_minor);
        let greeting = confirmation
            .customer_name
            .as_deref()
            .map(|name| format!("Hi {},", name))
            .unwrap_or_else(|| "Hi,".to_string());

        let subject = format!(
            "Payment received: {} {}",
            amount, confirmation.currency
        );
        let text = format!(
            "{}\n\nWe received your payment of {} {} for {} {}.\n\
             Transaction reference: {}\n\nThank you.",
            greeting,
            amount,
            confirmation.currency,
            confirmation.target_kind,
            confirmation.target_id,
            confirmation.reference,
        );
        (subject, text)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_payment_confirmation(&self, confirmation: &PaymentConfirmation) -> Result<()> {
        let Some(api_key) = &self.api_key else {
            tracing::info!(
                "Email disabled, skipping confirmation for {} ({})",
                confirmation.reference,
                confirmation.to_email
            );
            return Ok(());
        };

        let (subject, text) = self.compose(confirmation);
        let body = ResendEmailRequest {
            from: &self.from,
            to: vec![&confirmation.to_email],
            subject,
            text,
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Resend API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Resend API error: {}",
                error_text
            )));
        }

        Ok(())
    }
}

/// Build the confirmation for a transaction that just settled its target.
pub fn confirmation_for(
    transaction: &PaymentTransaction,
    target_kind: &'static str,
    target_id: &str,
) -> PaymentConfirmation {
    PaymentConfirmation {
        to_email: transaction.customer_email.clone(),
        customer_name: transaction.customer_name.clone(),
        reference: transaction.transaction_reference.clone(),
        amount_minor: transaction.amount_minor,
        currency: transaction.currency.clone(),
        target_kind,
        target_id: target_id.to_string(),
    }
}
