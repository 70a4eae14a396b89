use axum::extract::State;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, TenantAuth};
use crate::models::{GatewayName, PaymentGateway, UpsertGateway};

/// Gateway configuration with the secret redacted.
#[derive(Debug, Serialize)]
pub struct GatewayView {
    pub id: String,
    pub gateway_name: GatewayName,
    pub public_key: String,
    pub test_mode: bool,
    pub is_active: bool,
    pub is_default: bool,
}

impl From<&PaymentGateway> for GatewayView {
    fn from(g: &PaymentGateway) -> Self {
        Self {
            id: g.id.clone(),
            gateway_name: g.gateway_name,
            public_key: g.public_key.clone(),
            test_mode: g.test_mode,
            is_active: g.is_active,
            is_default: g.is_default,
        }
    }
}

/// PUT /tenants/gateways (authenticated)
///
/// Create or replace one of the tenant's gateway configurations. Setting
/// `is_default` atomically clears the previous default.
pub async fn upsert_gateway(
    State(state): State<AppState>,
    TenantAuth(tenant): TenantAuth,
    Json(input): Json<UpsertGateway>,
) -> Result<Json<GatewayView>> {
    let mut conn = state.db.get()?;
    let gateway = queries::upsert_gateway(&mut conn, &tenant.id, &input, &state.master_key)?;

    tracing::info!(
        "Tenant {} configured {} gateway (default: {})",
        tenant.id,
        gateway.gateway_name,
        gateway.is_default
    );

    Ok(Json(GatewayView::from(&gateway)))
}

/// GET /tenants/gateways (authenticated)
pub async fn list_gateways(
    State(state): State<AppState>,
    TenantAuth(tenant): TenantAuth,
) -> Result<Json<Vec<GatewayView>>> {
    let conn = state.db.get()?;
    let gateways = queries::list_gateways(&conn, &tenant.id)?;
    Ok(Json(gateways.iter().map(GatewayView::from).collect()))
}
