use serde::{Deserialize, Serialize};

/// An isolated customer account of the back office.
///
/// Stands in for the external tenant resolver: the only facts the payment
/// core needs are the plan (fee tier) and the configured fee percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub plan: Plan,
    /// Configured platform fee in basis points (300 = 3%).
    /// Ignored for zero-fee plans.
    pub fee_percent_bps: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Subscription plan tier. Enterprise tenants pay no platform fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Standard,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn zero_fee(&self) -> bool {
        matches!(self, Self::Enterprise)
    }
}

impl std::str::FromStr for Plan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data required to create a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub plan: Plan,
    #[serde(default)]
    pub fee_percent_bps: Option<i64>,
}
