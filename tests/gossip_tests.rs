//! Gossip loop and receive handler, wired to an in-memory transport.

use parking_lot::Mutex;
use perps_node_core::gossip::{decode_batch, encode_batch, log_error_sink};
use perps_node_core::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingTransport {
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTransport {
    fn batches(&self) -> Vec<Vec<SignedOrder>> {
        self.payloads.lock().iter().map(|p| decode_batch(p).unwrap()).collect()
    }
}

impl GossipTransport for RecordingTransport {
    fn broadcast(&self, payload: Vec<u8>) -> Result<(), GossipError> {
        self.payloads.lock().push(payload);
        Ok(())
    }
}

struct Node {
    store: SharedStore,
    transport: Arc<RecordingTransport>,
    stats: Arc<GossipStats>,
    handle: GossipHandle,
    handler: GossipHandler,
    shutdown: gossip::GossipShutdown,
    task: tokio::task::JoinHandle<()>,
}

fn node(config: GossipConfig) -> Node {
    let store = Store::default().shared();
    let transport = Arc::new(RecordingTransport::default());
    let stats = Arc::new(GossipStats::default());
    let (gossiper, handle, shutdown) = Gossiper::new(config, transport.clone(), stats.clone(), log_error_sink());
    let task = tokio::spawn(gossiper.run());
    let handler = GossipHandler::new(store.clone(), handle.clone(), stats.clone());
    Node { store, transport, stats, handle, handler, shutdown, task }
}

fn signed(salt: u64, expire_in_secs: i64) -> SignedOrder {
    let mut params = OrderParams::limit(MarketId(0), Address::from_low_u64(salt), dec!(1), Price::new_unchecked(dec!(20)), salt);
    params.order_type = OrderType::Signed;
    params.expire_at = Some(Timestamp::now().as_secs() + expire_in_secs);
    SignedOrder { order: params, signature: vec![1; 65] }
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn own_order_echoed_back_is_only_counted_as_known() {
    let a = node(GossipConfig::default());
    let order = signed(1, 3600);
    a.store.write().place_signed_order(order.clone(), Timestamp::now()).unwrap();
    a.handle.gossip_signed_orders(vec![order.clone()]).await.unwrap();
    settle(10).await;
    assert_eq!(a.transport.batches(), vec![vec![order.clone()]]);

    let echo = encode_batch(&[order]).unwrap();
    assert_eq!(a.handler.handle_signed_orders("peer-1", &echo).await, 0);
    settle(2_000).await;

    let stats = a.stats.snapshot();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.batches_received, 1);
    assert_eq!(stats.received_known, 1);
    assert_eq!(stats.received_new, 0);
    assert_eq!(stats.receive_errors, 0);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.batches_sent, 1);
    assert_eq!(a.transport.batches().len(), 1);
    assert_eq!(a.store.read().all_orders().len(), 1);

    a.shutdown.trigger();
    a.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn new_orders_are_placed_and_passed_on() {
    let b = node(GossipConfig::default());
    let fresh = signed(2, 3600);
    let known = signed(3, 3600);
    b.store.write().place_signed_order(known.clone(), Timestamp::now()).unwrap();

    let payload = encode_batch(&[fresh.clone(), known]).unwrap();
    assert_eq!(b.handler.handle_signed_orders("peer-1", &payload).await, 1);
    settle(10).await;

    assert!(b.store.read().contains_order(&fresh.hash().unwrap()));
    assert_eq!(b.transport.batches(), vec![vec![fresh]]);
    let stats = b.stats.snapshot();
    assert_eq!((stats.received, stats.received_new, stats.received_known), (2, 1, 1));

    b.shutdown.trigger();
    b.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn bad_payloads_are_ignored() {
    let n = node(GossipConfig::default());
    assert_eq!(n.handler.handle_signed_orders("peer-1", b"").await, 0);
    assert_eq!(n.handler.handle_signed_orders("peer-1", b"\x00\x01garbage").await, 0);
    // decodes to nothing: rejected before it counts as a batch
    assert_eq!(n.handler.handle_signed_orders("peer-1", b"[]").await, 0);
    assert_eq!(n.stats.snapshot(), GossipStatsSnapshot::default());

    // decodes, but already expired: counted as a receive error, not placed
    let stale = encode_batch(&[signed(4, -60)]).unwrap();
    assert_eq!(n.handler.handle_signed_orders("peer-1", &stale).await, 0);
    let stats = n.stats.snapshot();
    assert_eq!((stats.received, stats.receive_errors), (1, 1));
    assert!(n.store.read().all_orders().is_empty());

    n.shutdown.trigger();
    n.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn batches_are_capped_and_paced_by_ticks() {
    let config = GossipConfig { max_batch_size: 2, min_batch_interval_ms: 50, tick_interval_ms: 500, queue_capacity: 8 };
    let n = node(config);
    let orders: Vec<_> = (10..15).map(|salt| signed(salt, 3600)).collect();
    n.handle.gossip_signed_orders(orders).await.unwrap();

    settle(10).await;
    assert_eq!(n.transport.batches().len(), 1);
    settle(1_100).await;

    let batches = n.transport.batches();
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    let stats = n.stats.snapshot();
    assert_eq!((stats.sent, stats.batches_sent), (5, 3));

    n.shutdown.trigger();
    n.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn expired_orders_never_leave_the_node() {
    let n = node(GossipConfig::default());
    n.handle.gossip_signed_orders(vec![signed(20, -5), signed(21, -5)]).await.unwrap();
    settle(10).await;

    assert!(n.transport.batches().is_empty());
    let stats = n.stats.snapshot();
    assert_eq!((stats.expired, stats.sent, stats.batches_sent), (2, 0, 0));

    n.shutdown.trigger();
    n.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handle_refuses_after_shutdown() {
    let n = node(GossipConfig::default());
    n.shutdown.trigger();
    n.task.await.unwrap();

    let err = n.handle.gossip_signed_orders(vec![signed(30, 3600)]).await.unwrap_err();
    assert!(matches!(err, GossipError::Closed));
    assert!(n.handle.gossip_signed_orders(vec![]).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn exchange_submission_reaches_gossip() {
    let store_side = node(GossipConfig::default());
    let exchange = Exchange::new(EngineConfig::default()).unwrap().with_gossip(store_side.handle.clone());
    let order = signed(40, 3600);
    let hash = exchange.submit_signed_order(order.clone()).unwrap();
    settle(10).await;

    assert_eq!(store_side.transport.batches(), vec![vec![order.clone()]]);
    assert_eq!(exchange.all_orders()[0].hash, hash);
    assert!(matches!(exchange.submit_signed_order(order), Err(EngineError::Store(StoreError::OrderAlreadyExists(_)))));

    store_side.shutdown.trigger();
    store_side.task.await.unwrap();
}
