//! Periodic price ingestion

use crate::core::clock::Clock;
use crate::core::feed::PriceFeed;
use crate::core::rate::RatePoint;
use crate::rates::RateStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Pulls current prices for every known currency and appends them to the
/// rate store. This is the store's only writer.
pub struct IngestPoller {
    feed: Arc<dyn PriceFeed>,
    rates: Arc<RateStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl IngestPoller {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        rates: Arc<RateStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            feed,
            rates,
            clock,
            interval,
        }
    }

    /// Fetches and ingests one round of prices. Returns how many points were
    /// stored.
    pub async fn poll_once(&self) -> Result<usize> {
        let currencies = self.rates.currencies()?;
        if currencies.is_empty() {
            warn!("No currencies configured, nothing to poll");
            return Ok(0);
        }
        let names: Vec<String> = currencies.iter().map(|c| c.name.clone()).collect();
        let prices = self
            .feed
            .fetch_prices(&names)
            .await
            .context("Failed to fetch prices")?;

        let observed_at = self.clock.now();
        let mut ingested = 0;
        for currency in &currencies {
            let Some(&price) = prices.get(&currency.name) else {
                warn!(currency = %currency.name, "Price feed returned no quote");
                continue;
            };
            match self
                .rates
                .ingest(RatePoint::new(currency.id, price, observed_at))
            {
                Ok(()) => ingested += 1,
                Err(e) => error!(currency = %currency.name, error = %e, "Failed to store rate"),
            }
        }
        for key in prices.keys() {
            if !currencies.iter().any(|c| &c.name == key) {
                warn!(currency = %key, "Skipping quote for unknown currency");
            }
        }

        info!("Ingested {} of {} prices", ingested, currencies.len());
        Ok(ingested)
    }

    /// Polls every interval until `shutdown` changes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Price poll failed");
                    }
                }
            }
        }
        info!("Price poller stopped");
    }
}
