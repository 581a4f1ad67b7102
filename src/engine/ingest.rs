//! Everything that writes to the store: ledger events, oracle prices, signed orders.

use super::core::Exchange;
use super::results::EngineError;
use crate::events::{LedgerEvent, RawLog};
use crate::order::SignedOrder;
use crate::replay::ReplayReport;
use crate::types::{MarketId, OrderHash, Price, Timestamp};
use tracing::{debug, warn};

impl Exchange {
    /// Apply a batch of ledger events, reorg removals included. The write lock
    /// is held for the whole batch.
    pub fn ingest(&self, events: Vec<LedgerEvent>) -> ReplayReport {
        let mut store = self.store.write();
        self.replayer.apply(&mut store, events)
    }

    pub fn ingest_raw(&self, logs: &[RawLog]) -> ReplayReport {
        let mut store = self.store.write();
        self.replayer.apply_raw(&mut store, logs)
    }

    /// Events from finalized blocks.
    pub fn ingest_accepted(&self, events: Vec<LedgerEvent>) -> ReplayReport {
        let mut store = self.store.write();
        self.replayer.apply_accepted(&mut store, events)
    }

    pub fn set_oracle_price(&self, market: MarketId, price: Price) {
        self.store.write().set_oracle_price(market, price);
    }

    /// Place a locally received signed order and hand it to gossip.
    pub fn submit_signed_order(&self, signed: SignedOrder) -> Result<OrderHash, EngineError> {
        let hash = self.store.write().place_signed_order(signed.clone(), Timestamp::now())?;
        if let Some(gossip) = &self.gossip {
            // placed regardless: peers will see it on the ledger or a later re-gossip
            if let Err(err) = gossip.try_gossip(vec![signed]) {
                warn!(hash = %hash, error = %err, "signed order not queued for gossip");
            }
        }
        Ok(hash)
    }

    /// Drop orders whose expiry has passed.
    pub fn expire_orders(&self, now: Timestamp) -> Vec<OrderHash> {
        let expired = self.store.write().expire_orders(now);
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired orders removed");
        }
        expired
    }
}
