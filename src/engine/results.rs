// 8.0.2: errors and the outbound boundary.

use crate::config::ConfigError;
use crate::gossip::GossipError;
use crate::matching::{FillInstruction, LiquidationInstruction};
use crate::risk::RiskError;
use crate::store::StoreError;
use crate::types::MarketId;
use crate::validator::ValidationError;

/// Failure reported by whatever carries instructions to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("submission failed: {0}")]
pub struct SubmitError(pub String);

/// Carries match and liquidation instructions to the ledger.
/// A failed submission is reported, the store is left alone: the ledger's
/// own events are the only thing that moves order state.
pub trait InstructionSink {
    fn submit_fill(&self, fill: &FillInstruction) -> Result<(), SubmitError>;
    fn submit_liquidation(&self, liquidation: &LiquidationInstruction) -> Result<(), SubmitError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("matching already running for {0}")]
    MatchingInProgress(MarketId),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("gossip error: {0}")]
    Gossip(#[from] GossipError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}
