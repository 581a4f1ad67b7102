//! Matching rounds and instruction dispatch.

use super::core::Exchange;
use super::results::{EngineError, InstructionSink};
use crate::matching::MatchingRound;
use crate::types::MarketId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Marks a market as being matched; released on drop.
pub(super) struct MatchingGuard<'a> {
    markets: &'a Mutex<BTreeSet<MarketId>>,
    market: MarketId,
}

impl Drop for MatchingGuard<'_> {
    fn drop(&mut self) {
        self.markets.lock().remove(&self.market);
    }
}

impl Exchange {
    pub(super) fn begin_matching(&self, market: MarketId) -> Result<MatchingGuard<'_>, EngineError> {
        if !self.matching.lock().insert(market) {
            return Err(EngineError::MatchingInProgress(market));
        }
        Ok(MatchingGuard { markets: &self.matching, market })
    }

    /// One matching round: liquidations first when an oracle price is known,
    /// then regular crossing. Reads a consistent snapshot and writes nothing.
    pub fn tick(&self, market: MarketId) -> Result<MatchingRound, EngineError> {
        let _guard = self.begin_matching(market)?;
        let store = self.store.read();
        let params = self.markets.get(market);

        let round = match store.oracle_price(market) {
            Some(oracle) => {
                let candidates = self.risk.find_liquidable(&store, market, oracle);
                self.matcher.run_with_liquidations(&store, &params, oracle, candidates)
            }
            // no oracle, no liquidation band
            None => MatchingRound {
                liquidations: Vec::new(),
                fills: self.matcher.run(&store, market),
            },
        };
        Ok(round)
    }

    /// Send a round to the ledger. Failures go to `on_error` and never touch
    /// the store. Returns how many instructions were accepted.
    pub fn dispatch(&self, round: &MatchingRound, sink: &dyn InstructionSink, on_error: &dyn Fn(EngineError)) -> usize {
        let mut submitted = 0;
        for liquidation in &round.liquidations {
            match sink.submit_liquidation(liquidation) {
                Ok(()) => submitted += 1,
                Err(err) => {
                    warn!(trader = %liquidation.trader, order = %liquidation.order, error = %err, "liquidation submission failed");
                    on_error(err.into());
                }
            }
        }
        for fill in &round.fills {
            match sink.submit_fill(fill) {
                Ok(()) => submitted += 1,
                Err(err) => {
                    warn!(long = %fill.long, short = %fill.short, error = %err, "fill submission failed");
                    on_error(err.into());
                }
            }
        }
        debug!(submitted, total = round.liquidations.len() + round.fills.len(), "round dispatched");
        submitted
    }
}
