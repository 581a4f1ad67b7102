//! Continuous double auction over a market's sorted indices.
//!
//! Works on a snapshot: unfilled quantities are tracked locally while the
//! round is built and the store is never touched. The emitted instructions go
//! out to the ledger; the fills come back later as `OrdersMatched` events.

use crate::liquidation::LiquidationCandidates;
use crate::market::MarketParams;
use crate::order::Order;
use crate::store::Store;
use crate::types::{Address, MarketId, OrderHash, Price};
use crate::validator::price_bounds;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillInstruction {
    pub market: MarketId,
    pub long: OrderHash,
    pub short: OrderHash,
    pub fill_amount: Decimal,
}

/// Close `fill_amount` of `trader`'s position against a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationInstruction {
    pub market: MarketId,
    pub trader: Address,
    pub order: OrderHash,
    pub fill_amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchingRound {
    pub liquidations: Vec<LiquidationInstruction>,
    pub fills: Vec<FillInstruction>,
}

impl MatchingRound {
    pub fn is_empty(&self) -> bool {
        self.liquidations.is_empty() && self.fills.is_empty()
    }
}

// local view of an order while a round is being built
#[derive(Debug, Clone)]
struct Resting {
    hash: OrderHash,
    trader: Address,
    price: Price,
    unfilled: Decimal,
}

impl From<Order> for Resting {
    fn from(order: Order) -> Self {
        Self {
            hash: order.hash,
            trader: order.trader,
            price: order.price,
            unfilled: order.unfilled_abs(),
        }
    }
}

fn snapshot(orders: Vec<Order>) -> Vec<Resting> {
    orders.into_iter().map(Resting::from).collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingEngine;

impl MatchingEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, store: &Store, market: MarketId) -> Vec<FillInstruction> {
        let mut longs = snapshot(store.long_orders(market));
        let mut shorts = snapshot(store.short_orders(market));
        let fills = cross(market, &mut longs, &mut shorts);
        debug!(%market, fills = fills.len(), "matching round");
        fills
    }

    /// Liquidations first, most undercollateralized first, then regular matching
    /// on whatever order capacity is left.
    pub fn run_with_liquidations(&self, store: &Store, params: &MarketParams, oracle: Price, mut candidates: LiquidationCandidates) -> MatchingRound {
        let market = params.id;
        let mut longs = snapshot(store.long_orders(market));
        let mut shorts = snapshot(store.short_orders(market));
        let (upper, lower) = price_bounds(oracle, params.liquidation_spread_limit);

        let mut liquidations = Vec::new();
        // a long position is sold into resting longs priced at or above the lower bound
        for candidate in candidates.longs.iter_mut() {
            for order in longs.iter_mut() {
                if order.price.value() < lower {
                    break;
                }
                if let Some(amount) = take(candidate.unfilled(), order, candidate.trader) {
                    candidate.filled_size += amount;
                    liquidations.push(LiquidationInstruction { market, trader: candidate.trader, order: order.hash, fill_amount: amount });
                }
                if candidate.unfilled().is_zero() {
                    break;
                }
            }
        }
        for candidate in candidates.shorts.iter_mut() {
            for order in shorts.iter_mut() {
                if order.price.value() > upper {
                    break;
                }
                if let Some(amount) = take(candidate.unfilled(), order, candidate.trader) {
                    candidate.filled_size += amount;
                    liquidations.push(LiquidationInstruction { market, trader: candidate.trader, order: order.hash, fill_amount: amount });
                }
                if candidate.unfilled().is_zero() {
                    break;
                }
            }
        }

        let fills = cross(market, &mut longs, &mut shorts);
        debug!(%market, liquidations = liquidations.len(), fills = fills.len(), "matching round");
        MatchingRound { liquidations, fills }
    }
}

// consume up to `wanted` from the order. a trader's own orders can't absorb their liquidation.
fn take(wanted: Decimal, order: &mut Resting, trader: Address) -> Option<Decimal> {
    if order.trader == trader || order.unfilled.is_zero() || wanted <= Decimal::ZERO {
        return None;
    }
    let amount = wanted.min(order.unfilled);
    order.unfilled -= amount;
    Some(amount)
}

fn cross(market: MarketId, longs: &mut [Resting], shorts: &mut [Resting]) -> Vec<FillInstruction> {
    let mut fills = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < longs.len() && j < shorts.len() {
        let (long, short) = (&mut longs[i], &mut shorts[j]);
        if long.unfilled.is_zero() {
            i += 1;
            continue;
        }
        if short.unfilled.is_zero() {
            j += 1;
            continue;
        }
        if long.price < short.price {
            break;
        }
        let amount = long.unfilled.min(short.unfilled);
        fills.push(FillInstruction { market, long: long.hash, short: short.hash, fill_amount: amount });
        long.unfilled -= amount;
        short.unfilled -= amount;
        if long.unfilled.is_zero() {
            i += 1;
        }
        if short.unfilled.is_zero() {
            j += 1;
        }
    }
    fills
}
