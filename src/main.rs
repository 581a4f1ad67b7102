//! Replicated perps node simulation.
//!
//! Drives one node's deterministic core through the paths a live node sees:
//! ledger replay with a reorg, matching and fill validation, liquidation of an
//! underwater position, and signed order gossip between two nodes.

use perps_node_core::gossip::{encode_batch, log_error_sink};
use perps_node_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let config = EngineConfig::default();
    telemetry::init(&config.log_level);

    println!("Perps Node Core Simulation");
    println!("Single market, deterministic replay, off-chain order gossip\n");

    scenario_1_replay_and_reorg();
    scenario_2_matching_and_validation();
    scenario_3_liquidation();
    scenario_4_gossip();

    println!("\nAll simulations completed successfully.");
}

const MARKET: MarketId = MarketId(0);

fn trader(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn price(v: Decimal) -> Price {
    Price::new_unchecked(v)
}

fn limit(trader_id: u64, quantity: Decimal, limit_price: Decimal, salt: u64) -> OrderParams {
    OrderParams::limit(MARKET, trader(trader_id), quantity, price(limit_price), salt)
}

fn placed(block: u64, idx: u32, params: &OrderParams) -> LedgerEvent {
    LedgerEvent::new(block, idx, EventPayload::OrderPlaced(OrderPlacedEvent { order: params.clone() }))
}

fn deposit(block: u64, idx: u32, trader_id: u64, amount: Decimal) -> LedgerEvent {
    LedgerEvent::new(
        block,
        idx,
        EventPayload::MarginAdded(MarginChangeEvent { trader: trader(trader_id), collateral: CollateralId::QUOTE, amount }),
    )
}

fn position(block: u64, idx: u32, trader_id: u64, size: Decimal, open_notional: Decimal, at: Decimal) -> LedgerEvent {
    LedgerEvent::new(
        block,
        idx,
        EventPayload::PositionModified(PositionChangeEvent { trader: trader(trader_id), market: MARKET, size, open_notional, price: price(at) }),
    )
}

/// Order placement, a match, then a reorg that takes the match back.
fn scenario_1_replay_and_reorg() {
    println!("Scenario 1: Replay and Reorg\n");

    let exchange = Exchange::new(EngineConfig::default()).unwrap();
    let long = limit(1, dec!(10), dec!(20), 1);
    let short = limit(2, dec!(-10), dec!(20), 2);
    let (long_hash, short_hash) = (long.hash().unwrap(), short.hash().unwrap());

    let report = exchange.ingest(vec![placed(1, 0, &long), placed(1, 1, &short)]);
    println!("  Placed 2 orders, applied {}", report.applied);

    let matched = EventPayload::OrdersMatched(OrdersMatchedEvent {
        long_order: long_hash,
        short_order: short_hash,
        fill_amount: dec!(10),
        price: price(dec!(20)),
    });
    exchange.ingest(vec![LedgerEvent::new(2, 0, matched.clone())]);
    println!("  Matched 10 @ $20, resting longs: {}", exchange.long_orders(MARKET).len());

    // the block carrying the match is dropped and re-included one block later
    let report = exchange.ingest(vec![LedgerEvent::removed(2, 0, matched.clone()), LedgerEvent::new(3, 0, matched)]);
    println!("  Reorg: applied {} (removal + re-inclusion), skipped {}", report.applied, report.skipped);

    let store = exchange.store();
    let store = store.read();
    let order = store.order(&long_hash).unwrap();
    println!("  Long {} status {:?}, filled {}, head block {}\n", long_hash.short(), order.status, order.filled, store.head_block());
}

/// Crossing orders produce fills; the validator prices each one.
fn scenario_2_matching_and_validation() {
    println!("Scenario 2: Matching and Fill Validation\n");

    let exchange = Exchange::new(EngineConfig::default()).unwrap();
    let orders = [
        limit(1, dec!(5), dec!(21), 1),
        limit(2, dec!(3), dec!(20), 2),
        limit(3, dec!(-4), dec!(19.5), 3),
        limit(4, dec!(-6), dec!(20), 4),
    ];
    let events = orders.iter().enumerate().map(|(i, o)| placed(69 + i as u64, 0, o)).collect();
    exchange.ingest(events);
    exchange.set_oracle_price(MARKET, price(dec!(20)));

    let round = exchange.tick(MARKET).unwrap();
    println!("  {} fills:", round.fills.len());
    for fill in &round.fills {
        let validated = exchange.validate_orders(fill.long, fill.short, fill.fill_amount).unwrap();
        println!(
            "    {} x {} -> {} @ ${} (long {:?}, short {:?})",
            fill.long.short(),
            fill.short.short(),
            fill.fill_amount,
            validated.fill_price,
            validated.long_role,
            validated.short_role
        );
    }

    let submitted = exchange.dispatch(&round, &PrintSink, &|err| println!("    dispatch error: {err}"));
    println!("  Dispatched {submitted} instructions\n");
}

/// A long whose margin collapsed is sold into the resting bids first.
fn scenario_3_liquidation() {
    println!("Scenario 3: Liquidation\n");

    let exchange = Exchange::new(EngineConfig::default()).unwrap();
    let bid = limit(2, dec!(10), dec!(19.5), 1);
    let ask = limit(3, dec!(-2), dec!(19), 2);
    exchange.ingest(vec![
        deposit(1, 0, 1, dec!(25)),
        position(1, 1, 1, dec!(10), dec!(200), dec!(20)),
        placed(2, 0, &bid),
        placed(2, 1, &ask),
        deposit(3, 0, 9, dec!(100)),
        position(3, 1, 9, dec!(1), dec!(19), dec!(19)),
    ]);
    exchange.set_oracle_price(MARKET, price(dec!(19)));

    let mf = exchange.margin_fraction(&trader(1), MARKET, MarginMode::Maintenance).unwrap();
    println!("  Trader 1: long 10 @ $20, margin $25, price now $19, mf {mf}");
    let candidates = exchange.liquidable(MARKET);
    println!("  Liquidation candidates: {}", candidates.len());

    let round = exchange.tick(MARKET).unwrap();
    for liq in &round.liquidations {
        let validated = exchange.validate_liquidation(liq.trader, liq.order, liq.fill_amount).unwrap();
        println!("    liquidate {} of {} into {} @ ${}", liq.fill_amount, liq.trader, liq.order.short(), validated.fill_price);
    }
    println!("  Regular fills after liquidation: {}\n", round.fills.len());
}

/// Two nodes wired back to back: an order submitted on A lands in B's store.
fn scenario_4_gossip() {
    println!("Scenario 4: Signed Order Gossip\n");

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let config = EngineConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = Arc::new(ChannelTransport(tx));
        let stats_a = Arc::new(GossipStats::default());
        let (gossiper, handle, shutdown) = Gossiper::new(config.gossip, transport, stats_a.clone(), log_error_sink());
        let task = tokio::spawn(gossiper.run());

        let node_a = Exchange::new(config.clone()).unwrap().with_gossip(handle);
        let node_b = Exchange::new(config.clone()).unwrap();
        let stats_b = Arc::new(GossipStats::default());
        let (gossiper_b, handle_b, shutdown_b) = Gossiper::new(config.gossip, Arc::new(NullTransport), stats_b.clone(), log_error_sink());
        let task_b = tokio::spawn(gossiper_b.run());
        let handler_b = GossipHandler::new(node_b.store(), handle_b, stats_b.clone());

        let mut params = limit(5, dec!(1.5), dec!(20), 42);
        params.order_type = OrderType::Signed;
        params.expire_at = Some(Timestamp::now().as_secs() + 3600);
        let signed = SignedOrder { order: params, signature: vec![0xab; 65] };
        let hash = node_a.submit_signed_order(signed.clone()).unwrap();
        println!("  Node A accepted {}", hash.short());

        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten().unwrap();
        let fresh = handler_b.handle_signed_orders("node-a", &payload).await;
        println!("  Node B received {} new order(s), knows {}: {}", fresh, hash.short(), node_b.store().read().contains_order(&hash));

        // echoes stop at the first node that already knows the order
        let echo = encode_batch(&[signed]).unwrap();
        handler_b.handle_signed_orders("node-c", &echo).await;

        shutdown.trigger();
        shutdown_b.trigger();
        task.await.unwrap();
        task_b.await.unwrap();
        println!("  Node A stats: {:?}", stats_a.snapshot());
        println!("  Node B stats: {:?}", stats_b.snapshot());
    });
}

struct PrintSink;

impl InstructionSink for PrintSink {
    fn submit_fill(&self, fill: &FillInstruction) -> Result<(), SubmitError> {
        println!("    -> ledger: match {} / {} for {}", fill.long.short(), fill.short.short(), fill.fill_amount);
        Ok(())
    }

    fn submit_liquidation(&self, liquidation: &LiquidationInstruction) -> Result<(), SubmitError> {
        println!("    -> ledger: liquidate {} via {}", liquidation.trader, liquidation.order.short());
        Ok(())
    }
}

struct ChannelTransport(tokio::sync::mpsc::UnboundedSender<Vec<u8>>);

impl GossipTransport for ChannelTransport {
    fn broadcast(&self, payload: Vec<u8>) -> Result<(), GossipError> {
        self.0.send(payload).map_err(|e| GossipError::Transport(e.to_string()))
    }
}

struct NullTransport;

impl GossipTransport for NullTransport {
    fn broadcast(&self, _payload: Vec<u8>) -> Result<(), GossipError> {
        Ok(())
    }
}
