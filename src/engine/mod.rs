// 8.0: node orchestrator. owns the shared store and wires replay, risk,
// matching, validation and gossip together. the store is only ever written
// through the replayer or the signed order path.

mod core;
mod ingest;
mod results;
mod rounds;
mod validation;

pub use self::core::Exchange;
pub use results::{EngineError, InstructionSink, SubmitError};
