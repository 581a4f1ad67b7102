// 11.0: ledger events the node replays into the store. the EventPayload enum lists all
// event kinds the orderbook and clearing house contracts emit.
// 11.1 RawLog is the decoded-but-untyped log as delivered. decode() is the only way
// in, and it both parses against the typed schema and checks the values.

use crate::order::OrderParams;
use crate::types::{Address, BlockNumber, CollateralId, MarketId, OrderHash, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One log record, tagged with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub block_number: BlockNumber,
    pub log_index: u32,
    /// set when a reorg retracts a previously delivered log
    #[serde(default)]
    pub removed: bool,
    pub payload: EventPayload,
}

impl LedgerEvent {
    pub fn new(block_number: BlockNumber, log_index: u32, payload: EventPayload) -> Self {
        Self {
            block_number,
            log_index,
            removed: false,
            payload,
        }
    }

    pub fn removed(block_number: BlockNumber, log_index: u32, payload: EventPayload) -> Self {
        Self {
            block_number,
            log_index,
            removed: true,
            payload,
        }
    }

    /// (block, log index) ascending
    pub fn chain_order(&self, other: &Self) -> Ordering {
        self.block_number
            .cmp(&other.block_number)
            .then(self.log_index.cmp(&other.log_index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EventPayload {
    // orderbook events
    OrderPlaced(OrderPlacedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrdersMatched(OrdersMatchedEvent),
    LiquidationOrderMatched(LiquidationOrderMatchedEvent),
    OrderMatchingError(OrderMatchingErrorEvent),

    // margin account events
    MarginAdded(MarginChangeEvent),
    MarginRemoved(MarginChangeEvent),
    MarginReserved(ReservedMarginEvent),
    MarginReleased(ReservedMarginEvent),
    PnLRealized(PnLRealizedEvent),

    // clearing house events
    FundingRateUpdated(FundingRateUpdatedEvent),
    FundingPaid(FundingPaidEvent),
    PositionModified(PositionChangeEvent),
    PositionLiquidated(PositionChangeEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderPlacedEvent {
    pub order: OrderParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderCancelledEvent {
    pub order_hash: OrderHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrdersMatchedEvent {
    pub long_order: OrderHash,
    pub short_order: OrderHash,
    /// unsigned base quantity
    pub fill_amount: Decimal,
    pub price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiquidationOrderMatchedEvent {
    pub trader: Address,
    pub order_hash: OrderHash,
    pub fill_amount: Decimal,
    pub price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderMatchingErrorEvent {
    pub order_hash: OrderHash,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarginChangeEvent {
    pub trader: Address,
    pub collateral: CollateralId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReservedMarginEvent {
    pub trader: Address,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PnLRealizedEvent {
    pub trader: Address,
    /// signed, credited to the quote collateral
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FundingRateUpdatedEvent {
    pub market: MarketId,
    pub cumulative_premium_fraction: Decimal,
    /// unix seconds
    pub next_funding_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FundingPaidEvent {
    pub trader: Address,
    pub market: MarketId,
    pub cumulative_premium_fraction: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionChangeEvent {
    pub trader: Address,
    pub market: MarketId,
    pub size: Decimal,
    pub open_notional: Decimal,
    /// trade price, becomes the market's last price
    pub price: Price,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("undecodable log payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid {kind} payload: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::OrderPlaced(_) => "OrderPlaced",
            EventPayload::OrderCancelled(_) => "OrderCancelled",
            EventPayload::OrdersMatched(_) => "OrdersMatched",
            EventPayload::LiquidationOrderMatched(_) => "LiquidationOrderMatched",
            EventPayload::OrderMatchingError(_) => "OrderMatchingError",
            EventPayload::MarginAdded(_) => "MarginAdded",
            EventPayload::MarginRemoved(_) => "MarginRemoved",
            EventPayload::MarginReserved(_) => "MarginReserved",
            EventPayload::MarginReleased(_) => "MarginReleased",
            EventPayload::PnLRealized(_) => "PnLRealized",
            EventPayload::FundingRateUpdated(_) => "FundingRateUpdated",
            EventPayload::FundingPaid(_) => "FundingPaid",
            EventPayload::PositionModified(_) => "PositionModified",
            EventPayload::PositionLiquidated(_) => "PositionLiquidated",
        }
    }

    /// Clearing house events only arrive from accepted blocks and have no inverse.
    pub fn is_reversible(&self) -> bool {
        !matches!(
            self,
            EventPayload::FundingRateUpdated(_)
                | EventPayload::FundingPaid(_)
                | EventPayload::PositionModified(_)
                | EventPayload::PositionLiquidated(_)
        )
    }

    /// Value checks the schema cannot express.
    pub fn validate(&self) -> Result<(), EventError> {
        let kind = self.kind();
        let invalid = |reason: String| Err(EventError::Invalid { kind, reason });
        match self {
            EventPayload::OrderPlaced(e) => {
                if let Err(err) = e.order.validate().and_then(|_| e.order.hash().map(|_| ())) {
                    return invalid(err.to_string());
                }
            }
            EventPayload::OrdersMatched(e) => {
                if e.fill_amount <= Decimal::ZERO {
                    return invalid(format!("fill amount {} must be positive", e.fill_amount));
                }
                if e.long_order == e.short_order {
                    return invalid("order matched against itself".to_string());
                }
            }
            EventPayload::LiquidationOrderMatched(e) => {
                if e.fill_amount <= Decimal::ZERO {
                    return invalid(format!("fill amount {} must be positive", e.fill_amount));
                }
            }
            EventPayload::MarginAdded(e) | EventPayload::MarginRemoved(e) => {
                if e.amount <= Decimal::ZERO {
                    return invalid(format!("amount {} must be positive", e.amount));
                }
            }
            EventPayload::MarginReserved(e) | EventPayload::MarginReleased(e) => {
                if e.amount <= Decimal::ZERO {
                    return invalid(format!("amount {} must be positive", e.amount));
                }
            }
            EventPayload::PositionModified(e) | EventPayload::PositionLiquidated(e) => {
                if e.open_notional < Decimal::ZERO {
                    return invalid(format!("open notional {} is negative", e.open_notional));
                }
                if e.price.value() <= Decimal::ZERO {
                    return invalid(format!("price {} must be positive", e.price));
                }
            }
            EventPayload::FundingRateUpdated(e) => {
                if e.next_funding_time < 0 {
                    return invalid(format!("next funding time {} is negative", e.next_funding_time));
                }
            }
            EventPayload::OrderCancelled(_)
            | EventPayload::OrderMatchingError(_)
            | EventPayload::PnLRealized(_)
            | EventPayload::FundingPaid(_) => {}
        }
        Ok(())
    }
}

/// A log as handed over by the ledger adapter, payload still untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub block_number: BlockNumber,
    pub log_index: u32,
    #[serde(default)]
    pub removed: bool,
    pub payload: serde_json::Value,
}

impl RawLog {
    pub fn decode(&self) -> Result<LedgerEvent, EventError> {
        let payload: EventPayload = serde_json::from_value(self.payload.clone())?;
        payload.validate()?;
        Ok(LedgerEvent {
            block_number: self.block_number,
            log_index: self.log_index,
            removed: self.removed,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw(payload: serde_json::Value) -> RawLog {
        RawLog { block_number: 7, log_index: 2, removed: false, payload }
    }

    #[test]
    fn decodes_margin_event() {
        let log = raw(json!({
            "event": "MarginAdded",
            "data": {
                "trader": "0x0000000000000000000000000000000000000001",
                "collateral": 0,
                "amount": "100.5"
            }
        }));
        let event = log.decode().unwrap();
        assert_eq!(event.block_number, 7);
        match event.payload {
            EventPayload::MarginAdded(e) => {
                assert_eq!(e.trader, Address::from_low_u64(1));
                assert_eq!(e.amount, dec!(100.5));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_rejected() {
        let log = raw(json!({
            "event": "OrderCancelled",
            "data": { "order_hash": format!("0x{}", "11".repeat(32)), "extra": 1 }
        }));
        assert!(matches!(log.decode(), Err(EventError::Decode(_))));
    }

    #[test]
    fn unknown_event_rejected() {
        let log = raw(json!({ "event": "Teleported", "data": {} }));
        assert!(matches!(log.decode(), Err(EventError::Decode(_))));
    }

    #[test]
    fn non_positive_fill_rejected() {
        let log = raw(json!({
            "event": "OrdersMatched",
            "data": {
                "long_order": format!("0x{}", "11".repeat(32)),
                "short_order": format!("0x{}", "22".repeat(32)),
                "fill_amount": "0",
                "price": "20"
            }
        }));
        assert!(matches!(log.decode(), Err(EventError::Invalid { kind: "OrdersMatched", .. })));
    }

    #[test]
    fn clearing_house_events_are_irreversible() {
        let payload = EventPayload::FundingPaid(FundingPaidEvent {
            trader: Address::from_low_u64(1),
            market: MarketId(0),
            cumulative_premium_fraction: dec!(1),
        });
        assert!(!payload.is_reversible());
        let cancel = EventPayload::OrderCancelled(OrderCancelledEvent { order_hash: OrderHash([1; 32]) });
        assert!(cancel.is_reversible());
    }

    #[test]
    fn typed_payload_roundtrips_through_raw_form() {
        let payload = EventPayload::PnLRealized(PnLRealizedEvent {
            trader: Address::from_low_u64(3),
            realized_pnl: dec!(-12.5),
        });
        let log = RawLog {
            block_number: 1,
            log_index: 0,
            removed: true,
            payload: serde_json::to_value(&payload).unwrap(),
        };
        let event = log.decode().unwrap();
        assert!(event.removed);
        assert_eq!(event.payload, payload);
    }
}
