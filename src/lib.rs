// perps-node-core: deterministic core of a replicated perpetual futures exchange.
// every node derives the same book, positions and match decisions from the same
// ledger events. no I/O here beyond the gossip transport trait.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, Address, OrderHash, Side, Price, Timestamp
//   2.x  order.rs: order params, content hash, signed orders, lifecycle entries
//   2.2  book.rs: per market long/short indices in price-time priority
//   3.x  store.rs: orders, traders, market prices; the only mutable state
//   3.1  margin.rs: multi collateral margin, normalization
//   4.x  position.rs: position struct, notional, pnl, funding accrual
//   5.x  events.rs: typed ledger events and raw log decoding
//   5.1  replay.rs: two pass reorg replay onto the store
//   6.x  risk.rs: margin fractions, available margin
//   6.2  liquidation.rs: underwater position discovery
//   7.x  config.rs: engine settings, env presets, TOML loading
//   8.x  engine/: node orchestrator over the shared store
//   10.x validator.rs: fill price bounds and maker/taker roles
//   12.x market.rs: market params + runtime price state
//   13.x matching.rs: continuous double auction + liquidation pass
//   14.x gossip/: signed order flooding between nodes
//   15.x telemetry.rs: tracing subscriber setup

// state
pub mod book;
pub mod margin;
pub mod market;
pub mod order;
pub mod position;
pub mod store;
pub mod types;

// ledger input
pub mod events;
pub mod replay;

// decisions
pub mod liquidation;
pub mod matching;
pub mod risk;
pub mod validator;

// node plumbing
pub mod config;
pub mod engine;
pub mod gossip;
pub mod telemetry;

// re exports for convenience
pub use book::*;
pub use events::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use matching::*;
pub use order::*;
pub use position::*;
pub use replay::*;
pub use risk::*;
pub use store::*;
pub use types::*;
pub use validator::*;
pub use config::{ConfigError, EngineConfig, Environment};
pub use engine::{EngineError, Exchange, InstructionSink, SubmitError};
pub use gossip::{GossipConfig, GossipError, GossipHandle, GossipHandler, GossipStats, GossipStatsSnapshot, GossipTransport, Gossiper};
