use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the broadcast loop and the receive handler.
#[derive(Debug, Default)]
pub struct GossipStats {
    sent: AtomicU64,
    batches_sent: AtomicU64,
    expired: AtomicU64,
    received: AtomicU64,
    batches_received: AtomicU64,
    received_new: AtomicU64,
    received_known: AtomicU64,
    receive_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipStatsSnapshot {
    pub sent: u64,
    pub batches_sent: u64,
    pub expired: u64,
    pub received: u64,
    pub batches_received: u64,
    pub received_new: u64,
    pub received_known: u64,
    pub receive_errors: u64,
}

impl GossipStats {
    pub fn record_sent(&self, orders: usize) {
        self.sent.fetch_add(orders as u64, Ordering::SeqCst);
        self.batches_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_expired(&self, orders: usize) {
        self.expired.fetch_add(orders as u64, Ordering::SeqCst);
    }

    pub fn record_received(&self, orders: usize) {
        self.received.fetch_add(orders as u64, Ordering::SeqCst);
        self.batches_received.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_new(&self) {
        self.received_new.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_known(&self) {
        self.received_known.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> GossipStatsSnapshot {
        GossipStatsSnapshot {
            sent: self.sent.load(Ordering::SeqCst),
            batches_sent: self.batches_sent.load(Ordering::SeqCst),
            expired: self.expired.load(Ordering::SeqCst),
            received: self.received.load(Ordering::SeqCst),
            batches_received: self.batches_received.load(Ordering::SeqCst),
            received_new: self.received_new.load(Ordering::SeqCst),
            received_known: self.received_known.load(Ordering::SeqCst),
            receive_errors: self.receive_errors.load(Ordering::SeqCst),
        }
    }
}
