use crate::core::currency::CurrencyId;
use crate::core::store::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type UserId = i64;

/// Shortest accepted delivery interval, in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: UserId,
    /// Zero means delivery is switched off.
    pub interval_minutes: u32,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub active_currency_ids: BTreeSet<CurrencyId>,
}

impl Subscription {
    pub fn inactive(user_id: UserId) -> Self {
        Self {
            user_id,
            interval_minutes: 0,
            last_sent_at: None,
            active_currency_ids: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.interval_minutes > 0
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.last_sent_at {
            None => true,
            Some(last) => now >= last + Duration::minutes(i64::from(self.interval_minutes)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("interval of {0} minutes is below the minimum of {min}", min = MIN_INTERVAL_MINUTES)]
    InvalidInterval(u32),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}
