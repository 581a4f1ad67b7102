// 8.0 engine/core.rs: the Exchange. one per node, built from config, no globals.

use super::results::EngineError;
use crate::config::EngineConfig;
use crate::gossip::GossipHandle;
use crate::liquidation::LiquidationCandidates;
use crate::margin::Margin;
use crate::market::MarketRegistry;
use crate::matching::MatchingEngine;
use crate::order::Order;
use crate::position::Position;
use crate::replay::EventReplayer;
use crate::risk::{MarginMode, RiskEngine};
use crate::store::{SharedStore, Store};
use crate::types::{Address, MarketId, Price};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/** 8.1: node state. the store sits behind one RwLock shared with the gossip handler */
pub struct Exchange {
    pub(super) config: EngineConfig,
    pub(super) store: SharedStore,
    pub(super) replayer: EventReplayer,
    pub(super) risk: RiskEngine,
    pub(super) matcher: MatchingEngine,
    pub(super) markets: MarketRegistry,
    // markets with a matching round in progress
    pub(super) matching: Mutex<BTreeSet<MarketId>>,
    pub(super) gossip: Option<GossipHandle>,
}

impl Exchange {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            store: Store::new(config.store).shared(),
            replayer: EventReplayer::new(),
            risk: RiskEngine::new(config.risk, config.collateral_table()),
            matcher: MatchingEngine::new(),
            markets: config.market_registry(),
            matching: Mutex::new(BTreeSet::new()),
            gossip: None,
            config,
        })
    }

    /// Locally submitted signed orders are passed to this gossip loop.
    pub fn with_gossip(mut self, handle: GossipHandle) -> Self {
        self.gossip = Some(handle);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    pub fn markets(&self) -> &MarketRegistry {
        &self.markets
    }

    // 8.2: read api. every call takes the read lock once and returns owned data.

    pub fn all_orders(&self) -> Vec<Order> {
        self.store.read().all_orders()
    }

    pub fn long_orders(&self, market: MarketId) -> Vec<Order> {
        self.store.read().long_orders(market)
    }

    pub fn short_orders(&self, market: MarketId) -> Vec<Order> {
        self.store.read().short_orders(market)
    }

    pub fn position(&self, trader: &Address, market: MarketId) -> Option<Position> {
        self.store.read().position(trader, market).cloned()
    }

    pub fn margin(&self, trader: &Address) -> Option<Margin> {
        self.store.read().margin(trader).cloned()
    }

    pub fn last_price(&self, market: MarketId) -> Option<Price> {
        self.store.read().last_price(market)
    }

    pub fn next_funding_time(&self, market: MarketId) -> Option<i64> {
        self.store.read().next_funding_time(market)
    }

    /// Underwater positions in a market, or none while the market has no oracle price.
    pub fn liquidable(&self, market: MarketId) -> LiquidationCandidates {
        let store = self.store.read();
        match store.oracle_price(market) {
            Some(oracle) => self.risk.find_liquidable(&store, market, oracle),
            None => LiquidationCandidates::default(),
        }
    }

    pub fn margin_fraction(&self, trader: &Address, market: MarketId, mode: MarginMode) -> Result<Decimal, EngineError> {
        Ok(self.risk.margin_fraction(&self.store.read(), trader, market, mode)?)
    }

    pub fn notional_position_and_margin(&self, trader: &Address, include_funding: bool, mode: MarginMode) -> Result<(Decimal, Decimal), EngineError> {
        Ok(self.risk.notional_position_and_margin(&self.store.read(), trader, include_funding, mode)?)
    }

    pub fn available_margin(&self, trader: &Address) -> Result<Decimal, EngineError> {
        Ok(self.risk.available_margin(&self.store.read(), trader)?)
    }
}
