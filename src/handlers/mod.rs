pub mod gateways;
pub mod payments;
pub mod webhook;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/initialize", post(payments::initialize_payment))
        .route("/payments/verify", get(payments::verify_payment))
        .route("/payments/transactions", get(payments::list_transactions))
        .route("/payments/webhook", post(webhook::handle_payment_webhook))
        .route(
            "/tenants/gateways",
            put(gateways::upsert_gateway).get(gateways::list_gateways),
        )
}
