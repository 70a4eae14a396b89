//! Test utilities and fixtures for Paydesk integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

pub use paydesk::crypto::MasterKey;
pub use paydesk::db::{create_memory_pool, create_pool, init_db, queries, AppState, DbPool};
pub use paydesk::email::{Notifier, PaymentConfirmation};
pub use paydesk::error::{AppError, Result};
pub use paydesk::gateways::{
    ChargeRequest, GatewayAdapter, GatewayFactory, InitializedCharge, VerifyOutcome,
};
pub use paydesk::models::*;

/// Create a test master key (deterministic for testing)
pub fn test_master_key() -> MasterKey {
    MasterKey::from_bytes([0u8; 32])
}

/// Fee cap used across tests: 500.00 in minor units.
pub const TEST_FEE_CAP_MINOR: i64 = 50_000;

/// Notifier that records every confirmation instead of sending email.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<PaymentConfirmation>>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_payment_confirmation(&self, confirmation: &PaymentConfirmation) -> Result<()> {
        self.sent.lock().unwrap().push(confirmation.clone());
        Ok(())
    }
}

/// Scripted gateway adapter: returns a fixed verify outcome and records the
/// initialize calls it receives.
#[derive(Clone)]
pub struct FakeGateway {
    inner: Arc<FakeGatewayInner>,
}

struct FakeGatewayInner {
    outcome: Mutex<VerifyOutcome>,
    verify_calls: AtomicUsize,
    last_charge: Mutex<Option<ChargeRequest>>,
    fail_initialize: bool,
}

impl FakeGateway {
    pub fn returning(outcome: VerifyOutcome) -> Self {
        Self {
            inner: Arc::new(FakeGatewayInner {
                outcome: Mutex::new(outcome),
                verify_calls: AtomicUsize::new(0),
                last_charge: Mutex::new(None),
                fail_initialize: false,
            }),
        }
    }

    pub fn failing_initialize() -> Self {
        Self {
            inner: Arc::new(FakeGatewayInner {
                outcome: Mutex::new(failed_outcome("unused")),
                verify_calls: AtomicUsize::new(0),
                last_charge: Mutex::new(None),
                fail_initialize: true,
            }),
        }
    }

    pub fn set_outcome(&self, outcome: VerifyOutcome) {
        *self.inner.outcome.lock().unwrap() = outcome;
    }

    pub fn verify_calls(&self) -> usize {
        self.inner.verify_calls.load(Ordering::SeqCst)
    }

    pub fn last_charge(&self) -> Option<ChargeRequest> {
        self.inner.last_charge.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayAdapter for FakeGateway {
    fn name(&self) -> GatewayName {
        GatewayName::Paystack
    }

    async fn initialize(&self, charge: &ChargeRequest) -> Result<InitializedCharge> {
        if self.inner.fail_initialize {
            return Err(AppError::Gateway("scripted initialize failure".into()));
        }
        *self.inner.last_charge.lock().unwrap() = Some(charge.clone());
        Ok(InitializedCharge {
            authorization_url: format!("https://checkout.test/{}", charge.reference),
            gateway_tx_id: Some("ACCESS_test_code".to_string()),
            raw: serde_json::json!({ "status": true }),
        })
    }

    async fn verify(&self, _reference: &str) -> Result<VerifyOutcome> {
        self.inner.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.outcome.lock().unwrap().clone())
    }
}

pub struct FakeGatewayFactory {
    pub gateway: FakeGateway,
}

impl GatewayFactory for FakeGatewayFactory {
    fn adapter(&self, _gateway: &PaymentGateway, _secret_key: String) -> Box<dyn GatewayAdapter> {
        Box::new(self.gateway.clone())
    }
}

/// Successful verify outcome for the given minor-unit amount.
pub fn success_outcome(amount_minor: i64) -> VerifyOutcome {
    VerifyOutcome {
        status: TransactionStatus::Success,
        gateway_tx_id: Some("4099260516".to_string()),
        amount_minor: Some(amount_minor),
        paid_at: Some(1_709_288_100),
        raw: serde_json::json!({ "data": { "status": "success" } }),
        failure_reason: None,
    }
}

pub fn failed_outcome(reason: &str) -> VerifyOutcome {
    VerifyOutcome {
        status: TransactionStatus::Failed,
        gateway_tx_id: None,
        amount_minor: None,
        paid_at: None,
        raw: serde_json::json!({ "data": { "status": "failed" } }),
        failure_reason: Some(reason.to_string()),
    }
}

/// Create an AppState backed by a single shared in-memory database.
pub fn create_test_app_state(
    gateway: FakeGateway,
    notifier: RecordingNotifier,
) -> AppState {
    let pool = create_memory_pool().expect("Failed to create in-memory pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        master_key: test_master_key(),
        fee_cap_minor: TEST_FEE_CAP_MINOR,
        notifier: Arc::new(notifier),
        gateways: Arc::new(FakeGatewayFactory { gateway }),
    }
}

/// File-backed state for tests that need genuinely concurrent connections.
/// Keep the TempDir alive for the duration of the test.
pub fn create_file_backed_state(
    gateway: FakeGateway,
    notifier: RecordingNotifier,
) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("paydesk-test.db");
    let pool = create_pool(path.to_str().unwrap()).expect("Failed to create pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let state = AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        master_key: test_master_key(),
        fee_cap_minor: TEST_FEE_CAP_MINOR,
        notifier: Arc::new(notifier),
        gateways: Arc::new(FakeGatewayFactory { gateway }),
    };
    (state, dir)
}

/// Standalone file-backed pool for thread-level concurrency tests.
pub fn create_file_backed_pool() -> (DbPool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("paydesk-test.db");
    let pool = create_pool(path.to_str().unwrap()).expect("Failed to create pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    (pool, dir)
}

/// Plain in-memory connection for query-level tests.
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

pub fn create_test_tenant(conn: &Connection, name: &str, plan: Plan) -> (Tenant, String) {
    let api_key = queries::generate_api_key();
    let tenant = queries::create_tenant(
        conn,
        &CreateTenant {
            name: name.to_string(),
            plan,
            fee_percent_bps: None,
        },
        &api_key,
    )
    .expect("Failed to create test tenant");
    (tenant, api_key)
}

pub fn create_test_gateway(
    conn: &mut Connection,
    tenant_id: &str,
    name: GatewayName,
    is_default: bool,
) -> PaymentGateway {
    queries::upsert_gateway(
        conn,
        tenant_id,
        &UpsertGateway {
            gateway_name: name,
            secret_key: "sk_test_xxx".to_string(),
            public_key: "pk_test_xxx".to_string(),
            test_mode: true,
            is_active: true,
            is_default,
        },
        &test_master_key(),
    )
    .expect("Failed to create test gateway")
}

pub fn create_test_order(
    conn: &Connection,
    tenant_id: &str,
    total_minor: i64,
    merchant_subaccount: Option<&str>,
) -> Order {
    queries::create_order(
        conn,
        tenant_id,
        "buyer@example.com",
        total_minor,
        "NGN",
        merchant_subaccount,
    )
    .expect("Failed to create test order")
}

pub fn create_test_invoice(conn: &Connection, tenant_id: &str, amount_minor: i64) -> Invoice {
    queries::create_invoice(conn, tenant_id, "client@example.com", amount_minor, "NGN")
        .expect("Failed to create test invoice")
}

/// Insert a pending transaction tied to an optional settlement target.
pub fn create_pending_transaction(
    conn: &Connection,
    tenant_id: &str,
    reference: &str,
    amount_minor: i64,
    order_id: Option<&str>,
    invoice_id: Option<&str>,
) -> PaymentTransaction {
    let split = paydesk::fees::compute(amount_minor, 300, TEST_FEE_CAP_MINOR);
    queries::create_transaction(
        conn,
        &CreateTransaction {
            tenant_id: tenant_id.to_string(),
            transaction_reference: reference.to_string(),
            amount_minor,
            currency: "NGN".to_string(),
            platform_fee_minor: split.platform_fee_minor,
            merchant_amount_minor: split.merchant_amount_minor,
            status: TransactionStatus::Pending,
            gateway_name: GatewayName::Paystack,
            gateway_transaction_id: None,
            customer_email: "buyer@example.com".to_string(),
            customer_name: Some("Ada B".to_string()),
            order_id: order_id.map(|s| s.to_string()),
            invoice_id: invoice_id.map(|s| s.to_string()),
            gateway_response: None,
            paid_at: None,
            failure_reason: None,
        },
    )
    .expect("Failed to create test transaction")
}

/// Hex HMAC-SHA512 the way the gateways sign webhook bodies.
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
