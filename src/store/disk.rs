use crate::core::currency::{Currency, CurrencyId};
use crate::core::rate::RatePoint;
use crate::core::store::{Store, StoreError, SubscriptionUpdate};
use crate::core::subscription::{Subscription, UserId};
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode, Slice};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const CURRENCIES: &str = "currencies";
const RATES: &str = "rates";
const SUBSCRIPTIONS: &str = "subscriptions";

// rates key: currency id (4) | observed_at seconds, sign-flipped (8) |
// subsecond nanos (4) | sequence (4)
const RATE_KEY_LEN: usize = 20;
const SEQ_OFFSET: usize = 16;

fn ts_bytes(at: DateTime<Utc>) -> [u8; 12] {
    let mut bytes = [0; 12];
    bytes[..8].copy_from_slice(&((at.timestamp() as u64) ^ (1 << 63)).to_be_bytes());
    bytes[8..].copy_from_slice(&at.timestamp_subsec_nanos().to_be_bytes());
    bytes
}

fn rate_key(currency_id: CurrencyId, at: DateTime<Utc>, seq: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(RATE_KEY_LEN);
    key.extend_from_slice(&currency_id.to_be_bytes());
    key.extend_from_slice(&ts_bytes(at));
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn decode_rate(key: &[u8], value: &[u8]) -> Result<RatePoint, StoreError> {
    let corrupt = |detail: &str| StoreError::Corrupt {
        partition: RATES,
        detail: detail.to_string(),
    };
    let (Ok(id), Ok(secs), Ok(nanos), Ok(price)) = (
        <[u8; 4]>::try_from(key.get(0..4).unwrap_or_default()),
        <[u8; 8]>::try_from(key.get(4..12).unwrap_or_default()),
        <[u8; 4]>::try_from(key.get(12..SEQ_OFFSET).unwrap_or_default()),
        <[u8; 8]>::try_from(value),
    ) else {
        return Err(corrupt("unexpected key or value length"));
    };
    let secs = (u64::from_be_bytes(secs) ^ (1 << 63)) as i64;
    let observed_at = DateTime::from_timestamp(secs, u32::from_be_bytes(nanos))
        .ok_or_else(|| corrupt("timestamp out of range"))?;
    Ok(RatePoint {
        currency_id: CurrencyId::from_be_bytes(id),
        price: f64::from_be_bytes(price),
        observed_at,
    })
}

fn seq_of(key: &[u8]) -> u32 {
    key.get(SEQ_OFFSET..RATE_KEY_LEN)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map_or(0, u32::from_be_bytes)
}

/// Store backed by an embedded fjall keyspace with one partition per record
/// kind. Reads go straight to the partitions; writes are serialized.
pub struct DiskStore {
    keyspace: Keyspace,
    currencies: PartitionHandle,
    rates: PartitionHandle,
    subscriptions: PartitionHandle,
    write_lock: Mutex<()>,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let keyspace = Config::new(path).open()?;
        let currencies = keyspace.open_partition(CURRENCIES, PartitionCreateOptions::default())?;
        let rates = keyspace.open_partition(RATES, PartitionCreateOptions::default())?;
        let subscriptions =
            keyspace.open_partition(SUBSCRIPTIONS, PartitionCreateOptions::default())?;
        debug!("Opened fjall keyspace at {}", path.display());

        Ok(Self {
            keyspace,
            currencies,
            rates,
            subscriptions,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock.lock().map_err(|_| StoreError::Poisoned)
    }

    fn last_rate_in<I>(mut iter: I) -> Result<Option<RatePoint>, StoreError>
    where
        I: DoubleEndedIterator<Item = fjall::Result<(Slice, Slice)>>,
    {
        match iter.next_back() {
            Some(kv) => {
                let (key, value) = kv?;
                Ok(Some(decode_rate(&key, &value)?))
            }
            None => Ok(None),
        }
    }
}

impl Store for DiskStore {
    fn put_currency(&self, currency: &Currency) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        self.currencies.insert(
            currency.id.to_be_bytes().to_vec(),
            serde_json::to_vec(currency)?,
        )?;
        debug!(currency_id = currency.id, "Disk PUT currency");
        Ok(())
    }

    fn currencies(&self) -> Result<Vec<Currency>, StoreError> {
        self.currencies
            .iter()
            .map(|kv| -> Result<Currency, StoreError> {
                let (_, value) = kv?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn append_rate(&self, point: &RatePoint) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut prefix = point.currency_id.to_be_bytes().to_vec();
        prefix.extend_from_slice(&ts_bytes(point.observed_at));

        let seq = match self.rates.prefix(&prefix).next_back() {
            Some(kv) => seq_of(&kv?.0) + 1,
            None => 0,
        };
        self.rates.insert(
            rate_key(point.currency_id, point.observed_at, seq),
            point.price.to_be_bytes().to_vec(),
        )?;
        Ok(())
    }

    fn latest_rate(&self, currency_id: CurrencyId) -> Result<Option<RatePoint>, StoreError> {
        Self::last_rate_in(self.rates.prefix(currency_id.to_be_bytes()))
    }

    fn rates_between(
        &self,
        currency_id: CurrencyId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RatePoint>, StoreError> {
        let start = rate_key(currency_id, from, 0);
        let end = rate_key(currency_id, to, u32::MAX);
        self.rates
            .range(start..=end)
            .map(|kv| {
                let (key, value) = kv?;
                decode_rate(&key, &value)
            })
            .collect()
    }

    fn rate_at_or_before(
        &self,
        currency_id: CurrencyId,
        at: DateTime<Utc>,
    ) -> Result<Option<RatePoint>, StoreError> {
        let start = currency_id.to_be_bytes().to_vec();
        let end = rate_key(currency_id, at, u32::MAX);
        Self::last_rate_in(self.rates.range(start..=end))
    }

    fn subscription(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        match self.subscriptions.get(user_id.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        self.subscriptions
            .iter()
            .map(|kv| -> Result<Subscription, StoreError> {
                let (_, value) = kv?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn update_subscription(
        &self,
        user_id: UserId,
        update: SubscriptionUpdate<'_>,
    ) -> Result<Option<Subscription>, StoreError> {
        let _guard = self.lock()?;
        let current = self.subscription(user_id)?;
        let Some(next) = update(current.clone()) else {
            return Ok(current);
        };
        self.subscriptions
            .insert(user_id.to_be_bytes().to_vec(), serde_json::to_vec(&next)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(user_id, "Disk PUT subscription");
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
    }

    fn bitcoin() -> Currency {
        Currency {
            id: 1,
            name: "bitcoin".to_string(),
            display_name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
        }
    }

    #[test]
    fn test_rate_range_queries() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.append_rate(&RatePoint::new(1, 45000.0, t0())).unwrap();
        store
            .append_rate(&RatePoint::new(1, 46000.0, t0() + Duration::minutes(30)))
            .unwrap();
        store
            .append_rate(&RatePoint::new(2, 2500.0, t0() + Duration::minutes(31)))
            .unwrap();

        let latest = store.latest_rate(1).unwrap().unwrap();
        assert_eq!(latest.price, 46000.0);
        assert_eq!(latest.observed_at, t0() + Duration::minutes(30));

        let window = store
            .rates_between(1, t0(), t0() + Duration::minutes(30))
            .unwrap();
        assert_eq!(window.len(), 2);
        assert!(window.iter().all(|p| p.currency_id == 1));

        let before = store
            .rate_at_or_before(1, t0() + Duration::minutes(29))
            .unwrap()
            .unwrap();
        assert_eq!(before.price, 45000.0);
        assert!(store.rate_at_or_before(1, t0() - Duration::seconds(1)).unwrap().is_none());
        assert!(store.latest_rate(3).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_instants_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.append_rate(&RatePoint::new(1, 1.0, t0())).unwrap();
        store.append_rate(&RatePoint::new(1, 2.0, t0())).unwrap();
        store.append_rate(&RatePoint::new(1, 3.0, t0())).unwrap();

        let all: Vec<f64> = store
            .rates_between(1, t0(), t0())
            .unwrap()
            .iter()
            .map(|p| p.price)
            .collect();
        assert_eq!(all, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.latest_rate(1).unwrap().unwrap().price, 3.0);
    }

    #[test]
    fn test_sub_millisecond_timestamps_round_trip() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let early = t0() + Duration::microseconds(500);
        let late = t0() + Duration::nanoseconds(900_001);

        store.append_rate(&RatePoint::new(1, 1.0, early)).unwrap();
        store.append_rate(&RatePoint::new(1, 100.0, late)).unwrap();

        let latest = store.latest_rate(1).unwrap().unwrap();
        assert_eq!(latest.observed_at, late);
        assert_eq!(latest.price, 100.0);
        let before = store
            .rate_at_or_before(1, late - Duration::nanoseconds(1))
            .unwrap()
            .unwrap();
        assert_eq!(before.observed_at, early);
        assert_eq!(store.rates_between(1, early, early).unwrap().len(), 1);
    }

    #[test]
    fn test_pre_epoch_timestamps_sort_first() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let old = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();

        store.append_rate(&RatePoint::new(1, 1.0, old)).unwrap();
        store.append_rate(&RatePoint::new(1, 2.0, t0())).unwrap();

        assert_eq!(store.latest_rate(1).unwrap().unwrap().price, 2.0);
        assert_eq!(
            store.rate_at_or_before(1, old).unwrap().unwrap().observed_at,
            old
        );
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = DiskStore::open(dir.path()).unwrap();
            store.put_currency(&bitcoin()).unwrap();
            store.append_rate(&RatePoint::new(1, 45000.0, t0())).unwrap();
            store
                .update_subscription(42, &mut |_| {
                    Some(Subscription {
                        user_id: 42,
                        interval_minutes: 10,
                        last_sent_at: Some(t0()),
                        active_currency_ids: BTreeSet::from([1]),
                    })
                })
                .unwrap();
            store.keyspace.persist(PersistMode::SyncAll).unwrap();
        }

        let store = DiskStore::open(dir.path()).unwrap();
        assert_eq!(store.currencies().unwrap(), vec![bitcoin()]);
        assert_eq!(store.latest_rate(1).unwrap().unwrap().price, 45000.0);
        let sub = store.subscription(42).unwrap().unwrap();
        assert_eq!(sub.interval_minutes, 10);
        assert_eq!(sub.last_sent_at, Some(t0()));
        assert_eq!(store.subscriptions().unwrap().len(), 1);
    }
}
