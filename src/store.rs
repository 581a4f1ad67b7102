// 3.0 store.rs: the single owner of orders, positions, margin and market prices.
// every mutation validates first and writes second, so a failed call leaves no trace.
// all maps are BTreeMaps: iteration order feeds matching and liquidation decisions
// and must be identical on every node.
// blocks are either live (applied, still reorgable) or accepted (final). the head block
// and expiry of ledger touched orders both follow that split.

use crate::book::OrderBook;
use crate::margin::Margin;
use crate::market::MarketState;
use crate::order::{LifecycleEntry, Order, OrderError, OrderStatus, SignedOrder};
use crate::position::Position;
use crate::types::{Address, BlockNumber, CollateralId, MarketId, OrderHash, Price, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// max prior statuses kept per order
    pub max_lifecycle_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_lifecycle_depth: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    OrderNotFound(OrderHash),

    #[error("order {0} already exists")]
    OrderAlreadyExists(OrderHash),

    #[error("order {hash}: filled {filled} would exceed quantity {quantity}")]
    OverFill {
        hash: OrderHash,
        filled: Decimal,
        quantity: Decimal,
    },

    #[error("order {0}: lifecycle rollback with empty history")]
    LifecycleUnderflow(OrderHash),

    #[error("order {hash}: lifecycle history full at {depth} entries")]
    LifecycleOverflow { hash: OrderHash, depth: usize },

    #[error("order {0} expired before it could be placed")]
    Expired(OrderHash),

    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    #[error("{0} left the decimal range")]
    Overflow(&'static str),
}

impl StoreError {
    /// rollback underflow means replayed history and stored state disagree
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StoreError::LifecycleUnderflow(_))
    }
}

/// Per trader state. Created on first reference, never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trader {
    pub positions: BTreeMap<MarketId, Position>,
    pub margin: Margin,
}

/// What a fill update did to the order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillTransition {
    None,
    Filled,
    Reopened,
}

/// One lock over the whole store: readers see a consistent cut of every map.
pub type SharedStore = Arc<RwLock<Store>>;

#[derive(Debug, Clone, Default)]
pub struct Store {
    config: StoreConfig,
    orders: BTreeMap<OrderHash, Order>,
    traders: BTreeMap<Address, Trader>,
    markets: BTreeMap<MarketId, MarketState>,
    books: BTreeMap<MarketId, OrderBook>,
    /// applied, not retracted event count per live block
    live_blocks: BTreeMap<BlockNumber, usize>,
    accepted_block: BlockNumber,
    /// highest block of a ledger fill or status change per order
    touched: BTreeMap<OrderHash, BlockNumber>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn book_mut(&mut self, market: MarketId) -> &mut OrderBook {
        self.books.entry(market).or_insert_with(|| OrderBook::new(market))
    }

    fn order_mut(&mut self, hash: OrderHash) -> Result<&mut Order, StoreError> {
        self.orders.get_mut(&hash).ok_or(StoreError::OrderNotFound(hash))
    }

    fn trader_mut(&mut self, trader: Address) -> &mut Trader {
        self.traders.entry(trader).or_default()
    }

    fn market_mut(&mut self, market: MarketId) -> &mut MarketState {
        self.markets.entry(market).or_default()
    }

    fn sync_book(&mut self, hash: OrderHash) {
        if let Some(order) = self.orders.get(&hash) {
            let order = order.clone();
            self.book_mut(order.market).sync(&order);
        }
    }

    // 3.1: order lifecycle

    pub fn add_order(&mut self, order: Order) -> Result<(), StoreError> {
        if self.orders.contains_key(&order.hash) {
            return Err(StoreError::OrderAlreadyExists(order.hash));
        }
        self.trader_mut(order.trader);
        self.book_mut(order.market).sync(&order);
        self.orders.insert(order.hash, order);
        Ok(())
    }

    pub fn remove_order(&mut self, hash: OrderHash) -> Result<Order, StoreError> {
        let order = self.orders.remove(&hash).ok_or(StoreError::OrderNotFound(hash))?;
        self.book_mut(order.market).remove(&order);
        self.touched.remove(&hash);
        Ok(order)
    }

    fn touch(&mut self, hash: OrderHash, block: BlockNumber) {
        let last = self.touched.entry(hash).or_insert(block);
        *last = (*last).max(block);
    }

    /// Add a signed delta to `filled`. Reaching the full quantity moves a placed
    /// order to Filled, backing off a filled order restores its prior status.
    pub fn update_filled(&mut self, hash: OrderHash, delta: Decimal, block: BlockNumber) -> Result<FillTransition, StoreError> {
        let transition = self.check_fill(hash, delta)?;
        let order = self.order_mut(hash)?;
        // check_fill proved the sum in range
        order.filled += delta;
        match transition {
            FillTransition::Filled => push_status(order, OrderStatus::Filled, String::new(), block),
            FillTransition::Reopened => pop_status(order),
            FillTransition::None => {}
        }
        self.touch(hash, block);
        self.sync_book(hash);
        Ok(transition)
    }

    /// Dry run of [`Store::update_filled`]: what the delta would do, or why it can't.
    pub fn check_fill(&self, hash: OrderHash, delta: Decimal) -> Result<FillTransition, StoreError> {
        let max_depth = self.config.max_lifecycle_depth;
        let order = self.orders.get(&hash).ok_or(StoreError::OrderNotFound(hash))?;
        let filled = order.filled.checked_add(delta).ok_or(StoreError::Overflow("filled quantity"))?;
        let same_sign = filled.is_zero() || (filled > Decimal::ZERO) == (order.quantity > Decimal::ZERO);
        if !same_sign || filled.abs() > order.quantity.abs() {
            return Err(StoreError::OverFill {
                hash,
                filled,
                quantity: order.quantity,
            });
        }

        let complete = filled.abs() == order.quantity.abs();
        let transition = match order.status {
            OrderStatus::Placed if complete => {
                if order.lifecycle.len() >= max_depth {
                    return Err(StoreError::LifecycleOverflow { hash, depth: max_depth });
                }
                FillTransition::Filled
            }
            OrderStatus::Filled if !complete => {
                if order.lifecycle.is_empty() {
                    return Err(StoreError::LifecycleUnderflow(hash));
                }
                FillTransition::Reopened
            }
            _ => FillTransition::None,
        };
        Ok(transition)
    }

    pub fn set_status(&mut self, hash: OrderHash, status: OrderStatus, info: impl Into<String>, block: BlockNumber) -> Result<(), StoreError> {
        let max_depth = self.config.max_lifecycle_depth;
        let order = self.order_mut(hash)?;
        if order.lifecycle.len() >= max_depth {
            return Err(StoreError::LifecycleOverflow { hash, depth: max_depth });
        }
        push_status(order, status, info.into(), block);
        self.touch(hash, block);
        self.sync_book(hash);
        Ok(())
    }

    /// Undo the most recent status transition. Returns the restored status.
    pub fn revert_last_status(&mut self, hash: OrderHash) -> Result<OrderStatus, StoreError> {
        let order = self.order_mut(hash)?;
        if order.lifecycle.is_empty() {
            return Err(StoreError::LifecycleUnderflow(hash));
        }
        pop_status(order);
        let status = order.status;
        self.sync_book(hash);
        Ok(status)
    }

    pub fn place_signed_order(&mut self, signed: SignedOrder, now: Timestamp) -> Result<OrderHash, StoreError> {
        let order = Order::from_signed(signed, self.head_block())?;
        if order.is_expired(now) {
            return Err(StoreError::Expired(order.hash));
        }
        let hash = order.hash;
        self.add_order(order)?;
        Ok(hash)
    }

    /// Drop orders whose expiry has passed. Returns the dropped hashes.
    ///
    /// An order a live block filled or moved stays as a tombstone until that block
    /// is accepted, so a reorg can still find it and undo the change.
    pub fn expire_orders(&mut self, now: Timestamp) -> Vec<OrderHash> {
        let expired: Vec<OrderHash> = self
            .orders
            .values()
            .filter(|o| o.is_expired(now) && self.is_final(&o.hash))
            .map(|o| o.hash)
            .collect();
        for hash in &expired {
            // collected from the map above, so present
            let _ = self.remove_order(*hash);
        }
        expired
    }

    // no ledger change to this order can still be reorged away
    fn is_final(&self, hash: &OrderHash) -> bool {
        self.touched.get(hash).map_or(true, |block| *block <= self.accepted_block)
    }

    // 3.2: margin. a delta that would overflow is refused and nothing is written.

    pub fn update_margin(&mut self, trader: Address, collateral: CollateralId, delta: Decimal) -> Result<(), StoreError> {
        let mut margin = self.margin(&trader).cloned().unwrap_or_default();
        margin.apply_delta(collateral, delta).ok_or(StoreError::Overflow("margin"))?;
        self.trader_mut(trader).margin = margin;
        Ok(())
    }

    pub fn update_reserved_margin(&mut self, trader: Address, delta: Decimal) -> Result<(), StoreError> {
        let mut margin = self.margin(&trader).cloned().unwrap_or_default();
        margin.apply_reserved_delta(delta).ok_or(StoreError::Overflow("reserved margin"))?;
        self.trader_mut(trader).margin = margin;
        Ok(())
    }

    // 3.3: positions and funding

    pub fn update_position(&mut self, trader: Address, market: MarketId, size: Decimal, open_notional: Decimal) {
        let position = self.trader_mut(trader).positions.entry(market).or_default();
        position.size = size;
        position.open_notional = open_notional;
    }

    pub fn update_last_price(&mut self, market: MarketId, price: Price) {
        self.market_mut(market).last_price = Some(price);
    }

    pub fn set_oracle_price(&mut self, market: MarketId, price: Price) {
        self.market_mut(market).oracle_price = Some(price);
    }

    /// New cumulative premium: every position in the market re-accrues against it.
    /// All accruals are computed before any is written.
    pub fn update_funding(&mut self, market: MarketId, cumulative_premium_fraction: Decimal, next_funding_time: i64) -> Result<(), StoreError> {
        let mut owed = Vec::new();
        for (address, trader) in &self.traders {
            if let Some(position) = trader.positions.get(&market) {
                let amount = position
                    .funding_owed(cumulative_premium_fraction)
                    .ok_or(StoreError::Overflow("funding accrual"))?;
                owed.push((*address, amount));
            }
        }

        let state = self.market_mut(market);
        state.cumulative_premium_fraction = cumulative_premium_fraction;
        state.next_funding_time = next_funding_time;
        for (address, amount) in owed {
            if let Some(position) = self.traders.get_mut(&address).and_then(|t| t.positions.get_mut(&market)) {
                position.unrealized_funding = amount;
            }
        }
        Ok(())
    }

    pub fn settle_funding(&mut self, trader: Address, market: MarketId, premium_fraction: Decimal) {
        self.trader_mut(trader)
            .positions
            .entry(market)
            .or_default()
            .settle_funding(premium_fraction);
    }

    // 3.4: block tracking

    /// One new event from `block` was applied.
    pub fn note_block(&mut self, block: BlockNumber) {
        if block > self.accepted_block {
            *self.live_blocks.entry(block).or_insert(0) += 1;
        }
    }

    /// One event from `block` was retracted. The head rewinds once a block has
    /// nothing left applied.
    pub fn retract_block(&mut self, block: BlockNumber) {
        if let Some(count) = self.live_blocks.get_mut(&block) {
            *count -= 1;
            if *count == 0 {
                self.live_blocks.remove(&block);
            }
        }
    }

    /// `block` and everything before it is final.
    pub fn accept_block(&mut self, block: BlockNumber) {
        self.accepted_block = self.accepted_block.max(block);
        self.live_blocks = self.live_blocks.split_off(&self.accepted_block.saturating_add(1));
    }

    /// Highest block with an applied, unretracted event.
    pub fn head_block(&self) -> BlockNumber {
        self.live_blocks
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .max(self.accepted_block)
    }

    pub fn accepted_block(&self) -> BlockNumber {
        self.accepted_block
    }

    // 3.5: read api


    pub fn order(&self, hash: &OrderHash) -> Option<&Order> {
        self.orders.get(hash)
    }

    pub fn contains_order(&self, hash: &OrderHash) -> bool {
        self.orders.contains_key(hash)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn all_orders(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    /// open long orders, best first
    pub fn long_orders(&self, market: MarketId) -> Vec<Order> {
        self.books
            .get(&market)
            .map(|book| book.longs().filter_map(|k| self.orders.get(&k.hash())).cloned().collect())
            .unwrap_or_default()
    }

    /// open short orders, best first
    pub fn short_orders(&self, market: MarketId) -> Vec<Order> {
        self.books
            .get(&market)
            .map(|book| book.shorts().filter_map(|k| self.orders.get(&k.hash())).cloned().collect())
            .unwrap_or_default()
    }

    pub fn book(&self, market: MarketId) -> Option<&OrderBook> {
        self.books.get(&market)
    }

    pub fn trader(&self, trader: &Address) -> Option<&Trader> {
        self.traders.get(trader)
    }

    pub fn traders(&self) -> impl Iterator<Item = (&Address, &Trader)> {
        self.traders.iter()
    }

    pub fn position(&self, trader: &Address, market: MarketId) -> Option<&Position> {
        self.traders.get(trader).and_then(|t| t.positions.get(&market))
    }

    pub fn margin(&self, trader: &Address) -> Option<&Margin> {
        self.traders.get(trader).map(|t| &t.margin)
    }

    pub fn market(&self, market: MarketId) -> Option<&MarketState> {
        self.markets.get(&market)
    }

    pub fn markets(&self) -> impl Iterator<Item = (&MarketId, &MarketState)> {
        self.markets.iter()
    }

    pub fn last_price(&self, market: MarketId) -> Option<Price> {
        self.markets.get(&market).and_then(|m| m.last_price)
    }

    pub fn oracle_price(&self, market: MarketId) -> Option<Price> {
        self.markets.get(&market).and_then(|m| m.oracle_price)
    }

    pub fn next_funding_time(&self, market: MarketId) -> Option<i64> {
        self.markets.get(&market).map(|m| m.next_funding_time)
    }

    /// earliest scheduled funding across markets that have one
    pub fn earliest_funding_time(&self) -> Option<i64> {
        self.markets
            .values()
            .map(|m| m.next_funding_time)
            .filter(|t| *t > 0)
            .min()
    }
}

fn push_status(order: &mut Order, status: OrderStatus, info: String, block: BlockNumber) {
    let prior = LifecycleEntry {
        status: order.status,
        info: std::mem::take(&mut order.status_info),
        block,
    };
    order.lifecycle.push(prior);
    order.status = status;
    order.status_info = info;
}

// callers check for an empty stack first
fn pop_status(order: &mut Order) {
    if let Some(prior) = order.lifecycle.pop() {
        order.status = prior.status;
        order.status_info = prior.info;
    }
}
