//! Core domain types and the ports the rest of the crate plugs into

pub mod clock;
pub mod config;
pub mod currency;
pub mod feed;
pub mod log;
pub mod notify;
pub mod rate;
pub mod store;
pub mod subscription;

// Re-export main types for cleaner imports
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use currency::{Currency, CurrencyId};
pub use feed::PriceFeed;
pub use notify::{DeliveryError, Notifier};
pub use rate::{Change, RateError, RatePoint};
pub use store::{Store, StoreError};
pub use subscription::{RegistryError, Subscription, UserId};
