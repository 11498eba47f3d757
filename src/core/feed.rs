//! Price feed abstraction

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Source of current prices keyed by the currency's canonical name.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_prices(&self, ids: &[String]) -> Result<HashMap<String, f64>>;
}
