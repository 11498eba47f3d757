//! Subscription-driven digest delivery
//!
//! Every tick the scheduler asks the registry which subscriptions are due,
//! composes a digest for each from the rate store and hands it to the
//! notifier. Per-user pipelines run concurrently and never affect each other:
//! a failed delivery leaves the user due, so the next tick runs the whole
//! pipeline again.

pub mod digest;
pub mod retry;

use crate::core::clock::{Clock, Sleeper, TokioSleeper};
use crate::core::config::SchedulerConfig;
use crate::core::notify::{DeliveryError, Notifier};
use crate::core::subscription::{Subscription, UserId};
use crate::rates::RateStore;
use crate::registry::SubscriptionRegistry;
use chrono::{DateTime, Utc};
use futures::future::join_all;
pub use retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub tick: Duration,
    /// Upper bound for a single notifier call.
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick: config.tick(),
            send_timeout: config.send_timeout(),
            retry: RetryPolicy::fixed(config.max_attempts, config.retry_delay()),
        }
    }
}

/// What happened to one due subscription during a tick.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Sent { attempts: u32 },
    /// No rate data for any active currency; nothing was sent.
    Suppressed,
    /// Every attempt failed; the user stays due.
    Failed { attempts: u32, error: DeliveryError },
    /// Reading rates or the registry failed before sending.
    Aborted(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent { .. } => self.sent += 1,
            DeliveryOutcome::Suppressed => self.suppressed += 1,
            DeliveryOutcome::Failed { .. } | DeliveryOutcome::Aborted(_) => self.failed += 1,
        }
    }
}

pub struct DeliveryScheduler {
    rates: Arc<RateStore>,
    registry: Arc<SubscriptionRegistry>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    settings: SchedulerSettings,
}

impl DeliveryScheduler {
    pub fn new(
        rates: Arc<RateStore>,
        registry: Arc<SubscriptionRegistry>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            rates,
            registry,
            notifier,
            clock,
            sleeper: Arc::new(TokioSleeper),
            settings,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Ticks until `shutdown` changes. The stop signal is only observed
    /// between ticks, so deliveries already dispatched (retries included) run
    /// to completion first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick = ?self.settings.tick, "Delivery scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report.due > 0 {
                        info!(?report, "Tick finished");
                    }
                }
            }
        }
        info!("Delivery scheduler stopped");
    }

    /// Runs one delivery cycle for every subscription due now.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let due = match self.registry.due(now) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due subscriptions");
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        let outcomes = join_all(due.iter().map(|sub| self.deliver(sub, now))).await;
        for outcome in &outcomes {
            report.record(outcome);
        }
        report
    }

    /// Compose, send and mark one subscription.
    pub async fn deliver(&self, subscription: &Subscription, now: DateTime<Utc>) -> DeliveryOutcome {
        let user_id = subscription.user_id;

        let digest = match digest::compose(&self.rates, subscription, now) {
            Ok(Some(digest)) => digest,
            Ok(None) => {
                debug!(user_id, "No rate data for active currencies, digest suppressed");
                return DeliveryOutcome::Suppressed;
            }
            Err(e) => {
                error!(user_id, error = %e, "Failed to compose digest");
                return DeliveryOutcome::Aborted(e.to_string());
            }
        };

        match self.send(user_id, &digest.render()).await {
            Ok(attempts) => {
                // The disk store syncs on every subscription write
                let registry = self.registry.clone();
                let marked =
                    tokio::task::spawn_blocking(move || registry.mark_sent(user_id, now)).await;
                match marked {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(user_id, error = %e, "Digest sent but delivery time not recorded")
                    }
                    Err(e) => error!(user_id, error = %e, "Recording delivery time failed"),
                }
                debug!(user_id, attempts, "Digest delivered");
                DeliveryOutcome::Sent { attempts }
            }
            Err((attempts, error)) => {
                error!(user_id, attempts, error = %error, "Giving up on digest until next tick");
                DeliveryOutcome::Failed { attempts, error }
            }
        }
    }

    /// Sends with the retry policy. Returns the number of attempts used.
    async fn send(&self, user_id: UserId, text: &str) -> Result<u32, (u32, DeliveryError)> {
        let timeout = self.settings.send_timeout;
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(timeout, self.notifier.send(user_id, text))
                .await
                .unwrap_or(Err(DeliveryError::Timeout(timeout)));

            let error = match result {
                Ok(()) => return Ok(attempt),
                Err(error) => error,
            };
            match self.settings.retry.delay_after(attempt) {
                Some(delay) => {
                    warn!(user_id, attempt, error = %error, "Delivery failed, retrying in {:?}", delay);
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                None => return Err((attempt, error)),
            }
        }
    }
}
