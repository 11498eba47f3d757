//! Persistence port shared by the rate store and the subscription registry

use crate::core::currency::{Currency, CurrencyId};
use crate::core::rate::RatePoint;
use crate::core::subscription::{Subscription, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),
    #[error("failed to encode or decode record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("corrupt record in {partition}: {detail}")]
    Corrupt {
        partition: &'static str,
        detail: String,
    },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Read-modify-write step used by [`Store::update_subscription`]. Returning
/// `None` leaves the stored record untouched.
pub type SubscriptionUpdate<'a> = &'a mut dyn FnMut(Option<Subscription>) -> Option<Subscription>;

/// Storage backend. Rate history is append-only and ordered by observation
/// time, ties broken by insertion order.
pub trait Store: Send + Sync {
    fn put_currency(&self, currency: &Currency) -> Result<(), StoreError>;

    /// All currencies ordered by id.
    fn currencies(&self) -> Result<Vec<Currency>, StoreError>;

    fn append_rate(&self, point: &RatePoint) -> Result<(), StoreError>;

    fn latest_rate(&self, currency_id: CurrencyId) -> Result<Option<RatePoint>, StoreError>;

    /// Points with `from <= observed_at <= to`, oldest first.
    fn rates_between(
        &self,
        currency_id: CurrencyId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RatePoint>, StoreError>;

    /// Most recent point observed at or before `at`.
    fn rate_at_or_before(
        &self,
        currency_id: CurrencyId,
        at: DateTime<Utc>,
    ) -> Result<Option<RatePoint>, StoreError>;

    fn subscription(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError>;

    fn subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Atomically applies `update` to one user's record and returns what is
    /// stored afterwards.
    fn update_subscription(
        &self,
        user_id: UserId,
        update: SubscriptionUpdate<'_>,
    ) -> Result<Option<Subscription>, StoreError>;
}
