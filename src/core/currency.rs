//! Currency reference data

use serde::{Deserialize, Serialize};

pub type CurrencyId = u32;

/// A tracked coin. Created by seeding from configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    /// Canonical name, also the key used by the price feed (e.g. `bitcoin`).
    pub name: String,
    pub display_name: String,
    pub symbol: String,
}

impl Currency {
    /// Case-insensitive match on either the canonical name or the ticker symbol.
    pub fn matches(&self, query: &str) -> bool {
        self.name.eq_ignore_ascii_case(query) || self.symbol.eq_ignore_ascii_case(query)
    }
}
