//! Rate history queries on top of the storage backend

use crate::core::clock::Clock;
use crate::core::currency::{Currency, CurrencyId};
use crate::core::rate::{Change, RateError, RatePoint};
use crate::core::store::{Store, StoreError};
use chrono::Duration;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Append-only price history with latest, windowed and point-in-time lookups.
///
/// Ingestion is expected from a single poller; any number of readers may
/// query concurrently. Window queries are anchored at the injected clock.
pub struct RateStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl RateStore {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Registers reference currencies. Existing ids are overwritten.
    pub fn seed(&self, currencies: &[Currency]) -> Result<(), RateError> {
        for currency in currencies {
            self.store.put_currency(currency)?;
        }
        debug!("Seeded {} currencies", currencies.len());
        Ok(())
    }

    pub fn currencies(&self) -> Result<Vec<Currency>, RateError> {
        Ok(self.store.currencies()?)
    }

    pub fn currency(&self, currency_id: CurrencyId) -> Result<Currency, RateError> {
        self.currencies()?
            .into_iter()
            .find(|c| c.id == currency_id)
            .ok_or_else(|| RateError::UnknownCurrency(currency_id.to_string()))
    }

    /// Looks a currency up by ticker symbol or canonical name.
    pub fn find_currency(&self, query: &str) -> Result<Currency, RateError> {
        let query = query.trim();
        let currencies = self.currencies()?;
        currencies
            .iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(query))
            .or_else(|| currencies.iter().find(|c| c.matches(query)))
            .cloned()
            .ok_or_else(|| RateError::UnknownCurrency(query.to_string()))
    }

    #[instrument(skip(self), fields(currency_id = point.currency_id))]
    pub fn ingest(&self, point: RatePoint) -> Result<(), RateError> {
        self.currency(point.currency_id)?;

        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(latest) = self.store.latest_rate(point.currency_id)? {
            if point.observed_at < latest.observed_at {
                return Err(RateError::OutOfOrder {
                    currency_id: point.currency_id,
                    observed_at: point.observed_at,
                    latest: latest.observed_at,
                });
            }
        }
        self.store.append_rate(&point)?;
        debug!(price = point.price, "Ingested rate");
        Ok(())
    }

    pub fn latest(&self, currency_id: CurrencyId) -> Result<RatePoint, RateError> {
        self.store
            .latest_rate(currency_id)?
            .ok_or(RateError::NotFound { currency_id })
    }

    /// Latest observation for every currency that has one, ordered by id.
    pub fn latest_all(&self) -> Result<Vec<(Currency, RatePoint)>, RateError> {
        let mut rates = Vec::new();
        for currency in self.currencies()? {
            if let Some(point) = self.store.latest_rate(currency.id)? {
                rates.push((currency, point));
            }
        }
        Ok(rates)
    }

    /// Lowest and highest price observed within `[now - window, now]`.
    pub fn window_min_max(
        &self,
        currency_id: CurrencyId,
        window: Duration,
    ) -> Result<(f64, f64), RateError> {
        let now = self.clock.now();
        let points = self.store.rates_between(currency_id, now - window, now)?;
        if points.is_empty() {
            return Err(RateError::NotFound { currency_id });
        }

        Ok(points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), p| {
                (min.min(p.price), max.max(p.price))
            }))
    }

    /// Percentage move from the last price at or before `now - duration` to
    /// the latest price. `Change::Unknown` when there is no such baseline.
    pub fn change_since(
        &self,
        currency_id: CurrencyId,
        duration: Duration,
    ) -> Result<Change, RateError> {
        let latest = self.latest(currency_id)?;
        let cutoff = self.clock.now() - duration;

        match self.store.rate_at_or_before(currency_id, cutoff)? {
            Some(base) if base.price != 0.0 => Ok(Change::Percent(
                (latest.price - base.price) / base.price * 100.0,
            )),
            _ => Ok(Change::Unknown),
        }
    }
}
