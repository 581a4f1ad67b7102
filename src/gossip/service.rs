// 14.4: broadcast loop and receive path.
// the loop owns the pending set; everything else talks to it through a GossipHandle.

use super::codec::{decode_batch, encode_batch};
use super::pending::PendingOrders;
use super::stats::GossipStats;
use super::{ErrorSink, GossipConfig, GossipError, GossipTransport};
use crate::order::SignedOrder;
use crate::store::{SharedStore, StoreError};
use crate::types::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

/// Cloneable entry point into the gossip loop.
#[derive(Debug, Clone)]
pub struct GossipHandle {
    tx: mpsc::Sender<Vec<SignedOrder>>,
    shutdown: watch::Receiver<bool>,
}

impl GossipHandle {
    /// Queue orders for broadcast. Waits for queue space unless the node is
    /// shutting down, in which case the orders are dropped.
    pub async fn gossip_signed_orders(&self, orders: Vec<SignedOrder>) -> Result<(), GossipError> {
        if orders.is_empty() {
            return Ok(());
        }
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            sent = self.tx.send(orders) => sent.map_err(|_| GossipError::Closed),
            _ = shutdown_signalled(&mut shutdown) => Err(GossipError::Closed),
        }
    }

    /// Non-blocking variant for callers outside an async context.
    pub fn try_gossip(&self, orders: Vec<SignedOrder>) -> Result<(), GossipError> {
        if orders.is_empty() {
            return Ok(());
        }
        self.tx.try_send(orders).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => GossipError::Transport("gossip queue full".into()),
            mpsc::error::TrySendError::Closed(_) => GossipError::Closed,
        })
    }
}

#[derive(Debug)]
pub struct GossipShutdown(watch::Sender<bool>);

impl GossipShutdown {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        // sender gone counts as shutdown
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub struct Gossiper<T: GossipTransport> {
    config: GossipConfig,
    transport: Arc<T>,
    stats: Arc<GossipStats>,
    errors: ErrorSink,
    pending: PendingOrders,
    rx: mpsc::Receiver<Vec<SignedOrder>>,
    shutdown: watch::Receiver<bool>,
}

impl<T: GossipTransport> Gossiper<T> {
    pub fn new(config: GossipConfig, transport: Arc<T>, stats: Arc<GossipStats>, errors: ErrorSink) -> (Self, GossipHandle, GossipShutdown) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pending = PendingOrders::new(config.max_batch_size, Duration::from_millis(config.min_batch_interval_ms));
        let gossiper = Self {
            config,
            transport,
            stats,
            errors,
            pending,
            rx,
            shutdown: shutdown_rx.clone(),
        };
        let handle = GossipHandle { tx, shutdown: shutdown_rx };
        (gossiper, handle, GossipShutdown(shutdown_tx))
    }

    /// Runs until shutdown is triggered or every handle is dropped.
    pub async fn run(self) {
        let Self {
            config,
            transport,
            stats,
            errors,
            mut pending,
            mut rx,
            mut shutdown,
        } = self;

        let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush(&mut pending, transport.as_ref(), &stats, &errors);
                }
                received = rx.recv() => {
                    let Some(orders) = received else {
                        debug!("all gossip handles dropped");
                        break;
                    };
                    for order in orders {
                        pending.insert(order);
                    }
                    flush(&mut pending, transport.as_ref(), &stats, &errors);
                }
                _ = shutdown_signalled(&mut shutdown) => {
                    debug!(pending = pending.len(), "gossip loop shutting down");
                    break;
                }
            }
        }
    }
}

fn flush<T: GossipTransport>(pending: &mut PendingOrders, transport: &T, stats: &GossipStats, errors: &ErrorSink) {
    let Some(batch) = pending.take_batch(Instant::now(), Timestamp::now()) else {
        return;
    };
    if batch.expired > 0 {
        stats.record_expired(batch.expired);
        debug!(expired = batch.expired, "dropped expired orders before gossip");
    }
    if batch.orders.is_empty() {
        return;
    }
    stats.record_sent(batch.orders.len());
    trace!(orders = batch.orders.len(), "gossiping signed orders");
    let sent = encode_batch(&batch.orders).and_then(|payload| transport.broadcast(payload));
    if let Err(err) = sent {
        errors(err);
    }
}

/// Receive side. Orders new to this node are placed and passed on; known
/// ones stop here, which is what keeps the flood finite.
#[derive(Debug, Clone)]
pub struct GossipHandler {
    store: SharedStore,
    handle: GossipHandle,
    stats: Arc<GossipStats>,
}

impl GossipHandler {
    pub fn new(store: SharedStore, handle: GossipHandle, stats: Arc<GossipStats>) -> Self {
        Self { store, handle, stats }
    }

    /// Returns how many orders were new.
    pub async fn handle_signed_orders(&self, peer: &str, payload: &[u8]) -> usize {
        if payload.is_empty() {
            warn!(peer, "empty gossip payload");
            return 0;
        }
        let orders = match decode_batch(payload) {
            Ok(orders) if orders.is_empty() => {
                debug!(peer, "empty gossip batch");
                return 0;
            }
            Ok(orders) => orders,
            Err(err) => {
                trace!(peer, error = %err, "undecodable gossip payload");
                return 0;
            }
        };
        self.stats.record_received(orders.len());

        let now = Timestamp::now();
        let mut fresh = Vec::new();
        {
            let mut store = self.store.write();
            for order in orders {
                match store.place_signed_order(order.clone(), now) {
                    Ok(_) => {
                        self.stats.record_new();
                        fresh.push(order);
                    }
                    Err(StoreError::OrderAlreadyExists(_)) => self.stats.record_known(),
                    Err(err) => {
                        self.stats.record_receive_error();
                        error!(peer, error = %err, "rejected gossiped order");
                    }
                }
            }
        }

        let count = fresh.len();
        if let Err(err) = self.handle.gossip_signed_orders(fresh).await {
            debug!(peer, error = %err, "re-gossip skipped");
        }
        count
    }
}
