//! Per-user digest subscriptions

use crate::core::currency::CurrencyId;
use crate::core::store::Store;
use crate::core::subscription::{MIN_INTERVAL_MINUTES, RegistryError, Subscription, UserId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SubscriptionRegistry {
    store: Arc<dyn Store>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates or updates a subscription and activates every known currency
    /// for the user. The last delivery time is kept.
    pub fn subscribe(
        &self,
        user_id: UserId,
        interval_minutes: u32,
    ) -> Result<Subscription, RegistryError> {
        if interval_minutes < MIN_INTERVAL_MINUTES {
            return Err(RegistryError::InvalidInterval(interval_minutes));
        }
        let active: BTreeSet<CurrencyId> =
            self.store.currencies()?.into_iter().map(|c| c.id).collect();

        let mut updated = Subscription::inactive(user_id);
        self.store.update_subscription(user_id, &mut |current| {
            let mut sub = current.unwrap_or_else(|| Subscription::inactive(user_id));
            sub.interval_minutes = interval_minutes;
            sub.active_currency_ids = active.clone();
            updated = sub.clone();
            Some(sub)
        })?;
        info!(user_id, interval_minutes, "Subscribed");
        Ok(updated)
    }

    /// Switches delivery off. The active currency set and delivery history are
    /// kept so a later subscribe picks up where the user left off.
    pub fn unsubscribe(&self, user_id: UserId) -> Result<(), RegistryError> {
        self.store.update_subscription(user_id, &mut |current| {
            let mut sub = current.filter(Subscription::is_active)?;
            sub.interval_minutes = 0;
            Some(sub)
        })?;
        info!(user_id, "Unsubscribed");
        Ok(())
    }

    /// Active subscriptions whose interval has elapsed at `now`. No ordering
    /// is guaranteed.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, RegistryError> {
        let due: Vec<Subscription> = self
            .store
            .subscriptions()?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect();
        debug!("{} subscriptions due at {}", due.len(), now);
        Ok(due)
    }

    /// Records a confirmed delivery. Never moves `last_sent_at` backwards.
    pub fn mark_sent(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), RegistryError> {
        self.store.update_subscription(user_id, &mut |current| {
            let mut sub = current?;
            if sub.last_sent_at.is_some_and(|last| last >= now) {
                return None;
            }
            sub.last_sent_at = Some(now);
            Some(sub)
        })?;
        debug!(user_id, "Marked digest sent at {}", now);
        Ok(())
    }

    pub fn get(&self, user_id: UserId) -> Result<Option<Subscription>, RegistryError> {
        Ok(self.store.subscription(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::tests::{t0, test_currencies};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn setup() -> SubscriptionRegistry {
        let store = Arc::new(MemoryStore::new());
        for currency in test_currencies() {
            store.put_currency(&currency).unwrap();
        }
        SubscriptionRegistry::new(store)
    }

    #[test]
    fn test_subscribe_below_minimum_is_rejected() {
        let registry = setup();
        let err = registry.subscribe(1, 3).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInterval(3)));
        assert!(registry.get(1).unwrap().is_none());
    }

    #[test]
    fn test_subscribe_at_minimum_activates_all_currencies() {
        let registry = setup();
        let sub = registry.subscribe(1, 5).unwrap();
        assert_eq!(sub.interval_minutes, 5);
        assert_eq!(
            sub.active_currency_ids,
            BTreeSet::from([1, 2, 3, 4]),
        );
        assert_eq!(registry.get(1).unwrap(), Some(sub));
    }

    #[test]
    fn test_due_respects_interval() {
        let registry = setup();
        registry.subscribe(1, 10).unwrap();
        registry.mark_sent(1, t0()).unwrap();

        assert!(registry.due(t0() + Duration::minutes(9)).unwrap().is_empty());
        let due = registry.due(t0() + Duration::minutes(10)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, 1);

        let sent_at = t0() + Duration::minutes(12);
        registry.mark_sent(1, sent_at).unwrap();
        assert!(registry.due(sent_at + Duration::minutes(9)).unwrap().is_empty());
        assert_eq!(registry.due(sent_at + Duration::minutes(10)).unwrap().len(), 1);
    }

    #[test]
    fn test_new_subscription_is_due_immediately() {
        let registry = setup();
        registry.subscribe(1, 60).unwrap();
        assert_eq!(registry.due(t0()).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_sent_never_moves_backwards() {
        let registry = setup();
        registry.subscribe(1, 10).unwrap();
        registry.mark_sent(1, t0()).unwrap();
        registry.mark_sent(1, t0() - Duration::minutes(30)).unwrap();
        assert_eq!(registry.get(1).unwrap().unwrap().last_sent_at, Some(t0()));
    }

    #[test]
    fn test_unsubscribe_keeps_state_and_resubscribe_restores() {
        let registry = setup();
        registry.subscribe(1, 10).unwrap();
        registry.mark_sent(1, t0()).unwrap();
        registry.unsubscribe(1).unwrap();

        let sub = registry.get(1).unwrap().unwrap();
        assert!(!sub.is_active());
        assert_eq!(sub.last_sent_at, Some(t0()));
        assert_eq!(sub.active_currency_ids.len(), 4);
        assert!(registry.due(t0() + Duration::days(1)).unwrap().is_empty());

        let sub = registry.subscribe(1, 15).unwrap();
        assert_eq!(sub.last_sent_at, Some(t0()));
        assert_eq!(registry.due(t0() + Duration::minutes(15)).unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry = setup();
        // Unknown user
        registry.unsubscribe(9).unwrap();
        assert!(registry.get(9).unwrap().is_none());

        registry.subscribe(1, 10).unwrap();
        registry.unsubscribe(1).unwrap();
        let before = registry.get(1).unwrap();
        registry.unsubscribe(1).unwrap();
        assert_eq!(registry.get(1).unwrap(), before);
    }

    #[test]
    fn test_mark_sent_for_unknown_user_is_noop() {
        let registry = setup();
        registry.mark_sent(5, t0()).unwrap();
        assert!(registry.get(5).unwrap().is_none());
    }
}
