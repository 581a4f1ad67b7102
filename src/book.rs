// 2.1 book.rs: per market sorted views over the order map.
// longs: price desc, block asc. shorts: price asc, block asc. hash breaks the last tie
// so every node walks the book in the same order.

use crate::order::Order;
use crate::types::{BlockNumber, MarketId, OrderHash, Price, Side};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Priority key. Smaller key = better priority on its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    side: Side,
    price: Price,
    block_placed: BlockNumber,
    hash: OrderHash,
}

impl OrderKey {
    pub fn of(order: &Order) -> Self {
        Self {
            side: order.side(),
            price: order.price,
            block_placed: order.block_placed,
            hash: order.hash,
        }
    }

    pub fn hash(&self) -> OrderHash {
        self.hash
    }

    pub fn price(&self) -> Price {
        self.price
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // keys of one side only ever share a set, side first keeps Ord total anyway
        let by_price = match self.side {
            Side::Long => other.price.cmp(&self.price),
            Side::Short => self.price.cmp(&other.price),
        };
        self.side
            .cmp(&other.side)
            .then(by_price)
            .then(self.block_placed.cmp(&other.block_placed))
            .then(self.hash.cmp(&other.hash))
    }
}

/// Open orders of one market. Holds keys only, the store owns the orders.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub market: MarketId,
    longs: BTreeSet<OrderKey>,
    shorts: BTreeSet<OrderKey>,
}

impl OrderBook {
    pub fn new(market: MarketId) -> Self {
        Self {
            market,
            longs: BTreeSet::new(),
            shorts: BTreeSet::new(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeSet<OrderKey> {
        match side {
            Side::Long => &mut self.longs,
            Side::Short => &mut self.shorts,
        }
    }

    /// Bring the index in line with the order: indexed iff open.
    pub fn sync(&mut self, order: &Order) {
        let key = OrderKey::of(order);
        let set = self.side_mut(key.side);
        if order.is_open() {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    pub fn remove(&mut self, order: &Order) {
        let key = OrderKey::of(order);
        self.side_mut(key.side).remove(&key);
    }

    pub fn longs(&self) -> impl Iterator<Item = &OrderKey> {
        self.longs.iter()
    }

    pub fn shorts(&self) -> impl Iterator<Item = &OrderKey> {
        self.shorts.iter()
    }

    pub fn best_long(&self) -> Option<Price> {
        self.longs.first().map(|k| k.price)
    }

    pub fn best_short(&self) -> Option<Price> {
        self.shorts.first().map(|k| k.price)
    }

    pub fn len(&self) -> usize {
        self.longs.len() + self.shorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.longs.is_empty() && self.shorts.is_empty()
    }

    pub fn contains(&self, order: &Order) -> bool {
        let key = OrderKey::of(order);
        match key.side {
            Side::Long => self.longs.contains(&key),
            Side::Short => self.shorts.contains(&key),
        }
    }
}
