use crate::core::currency::{Currency, CurrencyId};
use crate::core::rate::RatePoint;
use crate::core::store::{Store, StoreError, SubscriptionUpdate};
use crate::core::subscription::{Subscription, UserId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Default)]
struct Inner {
    currencies: BTreeMap<CurrencyId, Currency>,
    // Each series is kept sorted by observation time, equal instants in
    // insertion order.
    rates: HashMap<CurrencyId, Vec<RatePoint>>,
    subscriptions: HashMap<UserId, Subscription>,
}

/// In-memory store implementation using a single RwLock
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates a new, empty MemoryStore instance
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn put_currency(&self, currency: &Currency) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        debug!(currency_id = currency.id, "Memory PUT currency");
        inner.currencies.insert(currency.id, currency.clone());
        Ok(())
    }

    fn currencies(&self) -> Result<Vec<Currency>, StoreError> {
        Ok(self.read()?.currencies.values().cloned().collect())
    }

    fn append_rate(&self, point: &RatePoint) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let series = inner.rates.entry(point.currency_id).or_default();
        let index = series.partition_point(|p| p.observed_at <= point.observed_at);
        series.insert(index, *point);
        Ok(())
    }

    fn latest_rate(&self, currency_id: CurrencyId) -> Result<Option<RatePoint>, StoreError> {
        Ok(self
            .read()?
            .rates
            .get(&currency_id)
            .and_then(|series| series.last().copied()))
    }

    fn rates_between(
        &self,
        currency_id: CurrencyId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RatePoint>, StoreError> {
        let inner = self.read()?;
        let Some(series) = inner.rates.get(&currency_id) else {
            return Ok(Vec::new());
        };
        let start = series.partition_point(|p| p.observed_at < from);
        let end = series.partition_point(|p| p.observed_at <= to);
        Ok(series.get(start..end).map(<[_]>::to_vec).unwrap_or_default())
    }

    fn rate_at_or_before(
        &self,
        currency_id: CurrencyId,
        at: DateTime<Utc>,
    ) -> Result<Option<RatePoint>, StoreError> {
        let inner = self.read()?;
        Ok(inner.rates.get(&currency_id).and_then(|series| {
            let end = series.partition_point(|p| p.observed_at <= at);
            end.checked_sub(1).map(|i| series[i])
        }))
    }

    fn subscription(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        Ok(self.read()?.subscriptions.get(&user_id).cloned())
    }

    fn subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.read()?.subscriptions.values().cloned().collect())
    }

    fn update_subscription(
        &self,
        user_id: UserId,
        update: SubscriptionUpdate<'_>,
    ) -> Result<Option<Subscription>, StoreError> {
        let mut inner = self.write()?;
        let current = inner.subscriptions.get(&user_id).cloned();
        match update(current.clone()) {
            Some(next) => {
                debug!(user_id, "Memory PUT subscription");
                inner.subscriptions.insert(user_id, next.clone());
                Ok(Some(next))
            }
            None => Ok(current),
        }
    }
}
