//! Digest composition

use crate::core::currency::Currency;
use crate::core::rate::{Change, DAY_WINDOW, HOUR_WINDOW, RateError, RatePoint};
use crate::core::subscription::Subscription;
use crate::rates::RateStore;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Most currencies rendered into one digest.
pub const MAX_DIGEST_CURRENCIES: usize = 3;

/// Snapshot of one currency: latest price plus day range and hourly change.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSummary {
    pub currency: Currency,
    pub latest: RatePoint,
    /// `None` when nothing was observed in the last 24 hours.
    pub day_range: Option<(f64, f64)>,
    pub hourly_change: Change,
}

impl RateSummary {
    /// Reads the aggregates for `currency`. `Ok(None)` when it has no rate
    /// history at all.
    pub fn load(rates: &RateStore, currency: Currency) -> Result<Option<Self>, RateError> {
        let latest = match rates.latest(currency.id) {
            Ok(point) => point,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let day_range = match rates.window_min_max(currency.id, DAY_WINDOW) {
            Ok(range) => Some(range),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let hourly_change = rates.change_since(currency.id, HOUR_WINDOW)?;

        Ok(Some(Self {
            currency,
            latest,
            day_range,
            hourly_change,
        }))
    }

    pub fn day_range_text(&self) -> String {
        self.day_range
            .map_or("n/a".to_string(), |(min, max)| format!("${min:.2} - ${max:.2}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub entries: Vec<RateSummary>,
    pub composed_at: DateTime<Utc>,
}

impl Digest {
    pub fn render(&self) -> String {
        let mut text = String::from("🔄 Rates update:\n\n");
        for entry in &self.entries {
            let _ = write!(
                text,
                "• {} ({}): ${:.2}\n  📊 Day: {}\n  📈 Hour: {}\n\n",
                entry.currency.display_name,
                entry.currency.symbol,
                entry.latest.price,
                entry.day_range_text(),
                entry.hourly_change,
            );
        }
        let _ = write!(
            text,
            "⏰ {}\n💡 /stopauto to turn off updates",
            self.composed_at.format("%H:%M UTC")
        );
        text
    }
}

/// Builds the digest for `subscription` from its first
/// [`MAX_DIGEST_CURRENCIES`] active currencies. Currencies without data are
/// skipped; `Ok(None)` means nothing was left to send.
pub fn compose(
    rates: &RateStore,
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> Result<Option<Digest>, RateError> {
    let mut entries = Vec::new();
    for &currency_id in subscription
        .active_currency_ids
        .iter()
        .take(MAX_DIGEST_CURRENCIES)
    {
        let currency = match rates.currency(currency_id) {
            Ok(currency) => currency,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };
        if let Some(summary) = RateSummary::load(rates, currency)? {
            entries.push(summary);
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(Digest {
        entries,
        composed_at: now,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::Clock;
    use crate::core::clock::testing::ManualClock;
    use crate::rates::tests::{t0, test_currencies};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn setup() -> (RateStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let rates = RateStore::new(Arc::new(MemoryStore::new()), clock.clone());
        rates.seed(&test_currencies()).unwrap();
        (rates, clock)
    }

    fn subscription(ids: &[u32]) -> Subscription {
        Subscription {
            user_id: 1,
            interval_minutes: 10,
            last_sent_at: None,
            active_currency_ids: ids.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_compose_caps_at_three_currencies() {
        let (rates, _) = setup();
        for id in 1..=4 {
            rates
                .ingest(RatePoint::new(id, f64::from(id) * 10.0, t0()))
                .unwrap();
        }

        let digest = compose(&rates, &subscription(&[1, 2, 3, 4]), t0())
            .unwrap()
            .unwrap();
        let ids: Vec<u32> = digest.entries.iter().map(|e| e.currency.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_compose_skips_currencies_without_data() {
        let (rates, _) = setup();
        rates.ingest(RatePoint::new(2, 2500.0, t0())).unwrap();

        let digest = compose(&rates, &subscription(&[1, 2, 3]), t0())
            .unwrap()
            .unwrap();
        assert_eq!(digest.entries.len(), 1);
        assert_eq!(digest.entries[0].currency.symbol, "ETH");
    }

    #[test]
    fn test_compose_without_any_data_is_suppressed() {
        let (rates, _) = setup();
        assert!(compose(&rates, &subscription(&[1, 2]), t0()).unwrap().is_none());
        assert!(compose(&rates, &subscription(&[]), t0()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_currency_in_active_set_is_skipped() {
        let (rates, _) = setup();
        rates.ingest(RatePoint::new(1, 45000.0, t0())).unwrap();
        let digest = compose(&rates, &subscription(&[1, 42]), t0())
            .unwrap()
            .unwrap();
        assert_eq!(digest.entries.len(), 1);
    }

    #[test]
    fn test_render_marks_missing_hourly_baseline() {
        let (rates, clock) = setup();
        rates.ingest(RatePoint::new(1, 45000.0, t0())).unwrap();
        clock.set(t0() + Duration::minutes(30));

        let text = compose(&rates, &subscription(&[1]), clock.now())
            .unwrap()
            .unwrap()
            .render();
        assert!(text.contains("Bitcoin (BTC): $45000.00"));
        assert!(text.contains("Day: $45000.00 - $45000.00"));
        assert!(text.contains("Hour: n/a"));
        assert!(text.contains("15:00 UTC"));
    }

    #[test]
    fn test_render_marks_empty_day_window() {
        let (rates, clock) = setup();
        rates.ingest(RatePoint::new(1, 45000.0, t0())).unwrap();
        clock.set(t0() + Duration::days(2));

        let text = compose(&rates, &subscription(&[1]), clock.now())
            .unwrap()
            .unwrap()
            .render();
        assert!(text.contains("Day: n/a"));
        assert!(text.contains("Hour: +0.00%"));
    }

    #[test]
    fn test_render_with_full_history() {
        let (rates, clock) = setup();
        rates.ingest(RatePoint::new(1, 45000.0, t0())).unwrap();
        rates
            .ingest(RatePoint::new(1, 46000.0, t0() + Duration::minutes(30)))
            .unwrap();
        rates
            .ingest(RatePoint::new(1, 49500.0, t0() + Duration::minutes(60)))
            .unwrap();
        clock.set(t0() + Duration::minutes(60));

        let text = compose(&rates, &subscription(&[1]), t0() + Duration::minutes(60))
            .unwrap()
            .unwrap()
            .render();
        assert!(text.contains("Bitcoin (BTC): $49500.00"));
        assert!(text.contains("Day: $45000.00 - $49500.00"));
        assert!(text.contains("Hour: +10.00%"));
        assert!(text.contains("15:30 UTC"));
    }
}
