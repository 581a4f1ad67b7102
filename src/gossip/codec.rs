// a batch on the wire is a JSON array of signed orders

use super::GossipError;
use crate::order::SignedOrder;

pub fn encode_batch(orders: &[SignedOrder]) -> Result<Vec<u8>, GossipError> {
    Ok(serde_json::to_vec(orders)?)
}

pub fn decode_batch(payload: &[u8]) -> Result<Vec<SignedOrder>, GossipError> {
    Ok(serde_json::from_slice(payload)?)
}
