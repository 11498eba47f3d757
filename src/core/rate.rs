//! Rate observations and aggregate results

use crate::core::currency::CurrencyId;
use crate::core::store::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Trailing window used for the daily min/max in digests and replies.
pub const DAY_WINDOW: Duration = Duration::hours(24);
/// Look-back used for the hourly change.
pub const HOUR_WINDOW: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub currency_id: CurrencyId,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl RatePoint {
    pub fn new(currency_id: CurrencyId, price: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            currency_id,
            price,
            observed_at,
        }
    }
}

/// Percentage change against an older observation.
///
/// `Unknown` means there was no observation old enough to compare with, which
/// is different from a flat price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
    Percent(f64),
    Unknown,
}

impl Change {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Change::Percent(p) => Some(*p),
            Change::Unknown => None,
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Percent(p) => write!(f, "{p:+.2}%"),
            Change::Unknown => write!(f, "n/a"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("no rate data for currency {currency_id}")]
    NotFound { currency_id: CurrencyId },
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),
    #[error(
        "observation at {observed_at} for currency {currency_id} is older than the latest at {latest}"
    )]
    OutOfOrder {
        currency_id: CurrencyId,
        observed_at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl RateError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RateError::NotFound { .. } | RateError::UnknownCurrency(_)
        )
    }
}
