use std::env;

use crate::crypto::MasterKey;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Platform fee ceiling in minor currency units (e.g. 50_000 = 500.00).
    pub fee_cap_minor: i64,
    /// Interval between pending-transaction sweep runs.
    pub sweep_interval_secs: u64,
    /// Minimum age before a pending transaction is re-verified by the sweep.
    pub sweep_min_age_secs: i64,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PAYDESK_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "paydesk.db".to_string()),
            base_url,
            fee_cap_minor: env::var("FEE_CAP_MINOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50_000),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 60),
            sweep_min_age_secs: env::var("SWEEP_MIN_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 60),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "payments@paydesk.local".to_string()),
            dev_mode,
        }
    }

    /// Load the master encryption key from PAYDESK_MASTER_KEY (base64).
    ///
    /// In dev mode a missing key falls back to a throwaway generated key so
    /// local runs work out of the box; production refuses to start without one.
    pub fn load_master_key(&self) -> Result<MasterKey> {
        match env::var("PAYDESK_MASTER_KEY") {
            Ok(encoded) => MasterKey::from_base64(&encoded),
            Err(_) if self.dev_mode => {
                tracing::warn!("PAYDESK_MASTER_KEY not set, generating a throwaway dev key");
                MasterKey::from_base64(&MasterKey::generate())
            }
            Err(_) => Err(AppError::Configuration(
                "PAYDESK_MASTER_KEY must be set (base64, 32 bytes)".into(),
            )),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
