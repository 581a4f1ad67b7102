// 14.0 gossip/: best effort flooding of off-chain signed orders between nodes.
// orders are deduplicated by hash on receipt, so receiving one any number of times is safe.
//   14.1 pending.rs: orders waiting for the next broadcast batch
//   14.2 stats.rs: atomic counters
//   14.3 codec.rs: batch wire format
//   14.4 service.rs: the broadcast loop, its handle, and the receive handler

mod codec;
mod pending;
mod service;
mod stats;

pub use codec::{decode_batch, encode_batch};
pub use pending::{PendingBatch, PendingOrders};
pub use service::{GossipHandle, GossipHandler, GossipShutdown, Gossiper};
pub use stats::{GossipStats, GossipStatsSnapshot};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipConfig {
    pub max_batch_size: usize,
    /// broadcasts closer together than this are deferred to a later tick
    pub min_batch_interval_ms: u64,
    pub tick_interval_ms: u64,
    /// bound on the hand-off queue into the gossip loop
    pub queue_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            min_batch_interval_ms: 50,
            tick_interval_ms: 500,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("batch codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("transport: {0}")]
    Transport(String),

    #[error("gossip loop has stopped")]
    Closed,
}

/// Peer to peer fan-out. Fire and forget: must not block.
pub trait GossipTransport: Send + Sync + 'static {
    fn broadcast(&self, payload: Vec<u8>) -> Result<(), GossipError>;
}

/// Where failures that nobody awaits end up.
pub type ErrorSink = Arc<dyn Fn(GossipError) + Send + Sync>;

pub fn log_error_sink() -> ErrorSink {
    Arc::new(|err| tracing::warn!(error = %err, "gossip failure"))
}
