//! Market configuration and runtime price state.

use crate::types::{MarketId, Price};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static per market parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    pub id: MarketId,
    /// fraction of oracle price a fill may deviate by (0.2 = 20%)
    pub spread_limit: Decimal,
    /// fraction of oracle price a liquidation fill may deviate by
    pub liquidation_spread_limit: Decimal,
}

impl MarketParams {
    pub fn new(id: MarketId) -> Self {
        Self {
            id,
            spread_limit: dec!(0.2),
            liquidation_spread_limit: dec!(0.05),
        }
    }
}

/// Configured markets. Unlisted markets get default parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketRegistry {
    markets: BTreeMap<MarketId, MarketParams>,
}

impl MarketRegistry {
    pub fn new(params: impl IntoIterator<Item = MarketParams>) -> Self {
        Self {
            markets: params.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn get(&self, id: MarketId) -> MarketParams {
        self.markets.get(&id).copied().unwrap_or_else(|| MarketParams::new(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.keys().copied()
    }
}

/// Prices the node has seen for a market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    /// from the most recent position event
    pub last_price: Option<Price>,
    /// pushed by the external feed
    pub oracle_price: Option<Price>,
    /// unix seconds
    pub next_funding_time: i64,
    pub cumulative_premium_fraction: Decimal,
}

impl MarketState {
    /// oracle stands in for a market that has not traded yet
    pub fn last_or_oracle(&self) -> Option<Price> {
        self.last_price.or(self.oracle_price)
    }
}
