//! Platform fee computation.
//!
//! All arithmetic is integer minor-unit (kobo, cents); the HTTP boundary
//! converts to and from major-unit decimals via `to_minor_units` /
//! `to_major_units`. Floats never touch money.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::models::Plan;

/// Default platform fee: 3% expressed in basis points.
pub const DEFAULT_FEE_BPS: i64 = 300;

/// Minor units per major unit. All supported gateway currencies are
/// two-decimal.
const MINOR_PER_MAJOR: i64 = 100;

/// A computed fee split. Invariant: `platform_fee_minor +
/// merchant_amount_minor == amount_minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub platform_fee_minor: i64,
    pub merchant_amount_minor: i64,
}

/// Compute the capped platform fee and the merchant remainder.
///
/// `fee = min(amount * bps / 10_000, cap)`, truncating division.
pub fn compute(amount_minor: i64, fee_bps: i64, cap_minor: i64) -> FeeBreakdown {
    let uncapped = amount_minor * fee_bps / 10_000;
    let platform_fee_minor = uncapped.min(cap_minor);
    FeeBreakdown {
        platform_fee_minor,
        merchant_amount_minor: amount_minor - platform_fee_minor,
    }
}

/// The fee percentage that actually applies to a tenant.
///
/// Zero-fee plans (enterprise) override whatever is configured.
pub fn effective_fee_bps(plan: Plan, configured_bps: i64) -> i64 {
    if plan.zero_fee() {
        0
    } else {
        configured_bps
    }
}

/// Convert a major-unit decimal amount to minor units, exactly.
///
/// A value with a fractional minor unit (e.g. 10.005) is a validation error,
/// not something to round away.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    let scaled = amount * Decimal::from(MINOR_PER_MAJOR);
    if scaled.fract() != Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "Amount {} has more than two decimal places",
            amount
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("Amount {} out of range", amount)))
}

/// Convert minor units back to a major-unit decimal (for responses and for
/// gateways that bill in major units).
pub fn to_major_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
