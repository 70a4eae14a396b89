//! Transaction reference generation.
//!
//! References are the idempotency key for the whole reconciliation protocol:
//! generated once at initiation, immutable, globally unique.
//!
//! Format: `TXN-{unix_millis}-{12 hex chars}`

use chrono::Utc;
use uuid::Uuid;

const PREFIX: &str = "TXN";
const RANDOM_LEN: usize = 12;

/// Generate a fresh transaction reference.
pub fn generate() -> String {
    let random = Uuid::new_v4().as_simple().to_string();
    format!("{}-{}-{}", PREFIX, Utc::now().timestamp_millis(), &random[..RANDOM_LEN])
}

/// Cheap format check to reject garbage before hitting the database.
pub fn is_valid(reference: &str) -> bool {
    let mut parts = reference.splitn(3, '-');
    let (Some(prefix), Some(millis), Some(random)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == PREFIX
        && !millis.is_empty()
        && millis.chars().all(|c| c.is_ascii_digit())
        && random.len() == RANDOM_LEN
        && random.chars().all(|c| c.is_ascii_hexdigit())
}
