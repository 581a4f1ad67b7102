// 14.1: orders queued for broadcast, keyed by hash so a re-queued order is sent once.

use crate::order::SignedOrder;
use crate::types::{OrderHash, Timestamp};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBatch {
    pub orders: Vec<SignedOrder>,
    pub expired: usize,
}

#[derive(Debug)]
pub struct PendingOrders {
    orders: BTreeMap<OrderHash, SignedOrder>,
    last_broadcast: Option<Instant>,
    max_batch_size: usize,
    min_interval: Duration,
}

impl PendingOrders {
    pub fn new(max_batch_size: usize, min_interval: Duration) -> Self {
        Self {
            orders: BTreeMap::new(),
            last_broadcast: None,
            max_batch_size,
            min_interval,
        }
    }

    /// false if the order can't be hashed
    pub fn insert(&mut self, order: SignedOrder) -> bool {
        match order.hash() {
            Ok(hash) => {
                self.orders.insert(hash, order);
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Drain the next batch, or None when throttled or idle. Expired orders are
    /// dropped on the way and don't count toward the batch size.
    pub fn take_batch(&mut self, at: Instant, now: Timestamp) -> Option<PendingBatch> {
        let throttled = self
            .last_broadcast
            .is_some_and(|last| at.saturating_duration_since(last) < self.min_interval);
        if throttled || self.orders.is_empty() {
            return None;
        }
        self.last_broadcast = Some(at);

        let mut batch = PendingBatch::default();
        while batch.orders.len() < self.max_batch_size {
            let Some((_, order)) = self.orders.pop_first() else {
                break;
            };
            if order.is_expired(now) {
                batch.expired += 1;
            } else {
                batch.orders.push(order);
            }
        }
        Some(batch)
    }
}
