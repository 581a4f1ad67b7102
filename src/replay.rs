//! Replays ledger events into the store.
//!
//! A batch may mix retracted (removed) logs with new ones. Removed logs are
//! undone newest first, then new logs are applied oldest first. Two stable
//! sorts and a concatenation give that order; a single loop applies it.
//! Each event either fully applies or leaves the store untouched.

use crate::events::{EventError, EventPayload, LedgerEvent, RawLog};
use crate::order::{Order, OrderStatus};
use crate::store::{Store, StoreError};
use crate::types::{CollateralId, OrderHash};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("store rejected event: {0}")]
    Store(#[from] StoreError),

    #[error("malformed event: {0}")]
    Malformed(#[from] EventError),

    #[error("{0} events cannot be rolled back")]
    IrreversibleRemoval(&'static str),
}

impl ReplayError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ReplayError::Store(e) if e.is_invariant_violation())
    }
}

/// Outcome of one replayed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub skipped: usize,
    /// lifecycle rollbacks that found nothing to pop. counted in `skipped` too.
    pub invariant_violations: usize,
}

impl ReplayReport {
    pub fn merge(&mut self, other: ReplayReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.invariant_violations += other.invariant_violations;
    }
}

/// Removed events by (block, log index) descending, then new events ascending.
pub fn replay_order(events: Vec<LedgerEvent>) -> Vec<LedgerEvent> {
    let (mut removed, mut new): (Vec<_>, Vec<_>) = events.into_iter().partition(|e| e.removed);
    removed.sort_by(|a, b| b.chain_order(a));
    new.sort_by(|a, b| a.chain_order(b));
    removed.extend(new);
    removed
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventReplayer;

impl EventReplayer {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, store: &mut Store, events: Vec<LedgerEvent>) -> ReplayReport {
        let mut report = ReplayReport::default();
        for event in replay_order(events) {
            self.apply_logged(store, &event, &mut report);
        }
        report
    }

    /// Decode then apply. Undecodable logs are skipped.
    pub fn apply_raw(&self, store: &mut Store, logs: &[RawLog]) -> ReplayReport {
        let mut report = ReplayReport::default();
        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match log.decode() {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(block = log.block_number, log_index = log.log_index, error = %err, "skipping undecodable log");
                    report.skipped += 1;
                }
            }
        }
        report.merge(self.apply(store, events));
        report
    }

    /// Events from accepted blocks: final, so applied ascending and never as removals.
    /// Their blocks can no longer be retracted.
    pub fn apply_accepted(&self, store: &mut Store, mut events: Vec<LedgerEvent>) -> ReplayReport {
        let mut report = ReplayReport::default();
        events.sort_by(|a, b| a.chain_order(b));
        for mut event in events {
            event.removed = false;
            self.apply_logged(store, &event, &mut report);
            store.accept_block(event.block_number);
        }
        report
    }

    fn apply_logged(&self, store: &mut Store, event: &LedgerEvent, report: &mut ReplayReport) {
        let kind = event.payload.kind();
        match self.apply_event(store, event) {
            Ok(()) => {
                report.applied += 1;
                info!(block = event.block_number, log_index = event.log_index, removed = event.removed, kind, "applied ledger event");
            }
            Err(err) if err.is_invariant_violation() => {
                report.skipped += 1;
                report.invariant_violations += 1;
                error!(block = event.block_number, log_index = event.log_index, kind, error = %err, "lifecycle invariant violated during replay");
            }
            Err(ReplayError::Store(StoreError::OrderAlreadyExists(hash))) => {
                report.skipped += 1;
                debug!(block = event.block_number, %hash, "order already known");
            }
            Err(err) => {
                report.skipped += 1;
                warn!(block = event.block_number, log_index = event.log_index, removed = event.removed, kind, error = %err, "skipping ledger event");
            }
        }
    }

    /// Apply a single event. Nothing is written unless every check passes.
    pub fn apply_event(&self, store: &mut Store, event: &LedgerEvent) -> Result<(), ReplayError> {
        event.payload.validate()?;
        let removed = event.removed;
        if removed && !event.payload.is_reversible() {
            return Err(ReplayError::IrreversibleRemoval(event.payload.kind()));
        }
        let block = event.block_number;
        // removal replays the same delta with the opposite sign
        let dir = if removed { Decimal::NEGATIVE_ONE } else { Decimal::ONE };

        match &event.payload {
            EventPayload::OrderPlaced(e) => {
                let order = Order::new(e.order.clone(), block).map_err(StoreError::from)?;
                if removed {
                    store.remove_order(order.hash)?;
                } else {
                    store.add_order(order)?;
                }
            }
            EventPayload::OrderCancelled(e) => {
                if removed {
                    store.revert_last_status(e.order_hash)?;
                } else {
                    store.set_status(e.order_hash, OrderStatus::Cancelled, "", block)?;
                }
            }
            EventPayload::OrdersMatched(e) => {
                let long_delta = fill_delta(store, e.long_order, e.fill_amount * dir)?;
                let short_delta = fill_delta(store, e.short_order, e.fill_amount * dir)?;
                store.check_fill(e.long_order, long_delta)?;
                store.check_fill(e.short_order, short_delta)?;
                store.update_filled(e.long_order, long_delta, block)?;
                store.update_filled(e.short_order, short_delta, block)?;
            }
            EventPayload::LiquidationOrderMatched(e) => {
                let delta = fill_delta(store, e.order_hash, e.fill_amount * dir)?;
                store.update_filled(e.order_hash, delta, block)?;
            }
            EventPayload::OrderMatchingError(e) => {
                if removed {
                    store.revert_last_status(e.order_hash)?;
                } else {
                    store.set_status(e.order_hash, OrderStatus::ExecutionFailed, e.error.clone(), block)?;
                }
            }
            EventPayload::MarginAdded(e) => store.update_margin(e.trader, e.collateral, e.amount * dir)?,
            EventPayload::MarginRemoved(e) => store.update_margin(e.trader, e.collateral, -e.amount * dir)?,
            EventPayload::MarginReserved(e) => store.update_reserved_margin(e.trader, e.amount * dir)?,
            EventPayload::MarginReleased(e) => store.update_reserved_margin(e.trader, -e.amount * dir)?,
            EventPayload::PnLRealized(e) => store.update_margin(e.trader, CollateralId::QUOTE, e.realized_pnl * dir)?,
            EventPayload::FundingRateUpdated(e) => {
                store.update_funding(e.market, e.cumulative_premium_fraction, e.next_funding_time)?
            }
            EventPayload::FundingPaid(e) => store.settle_funding(e.trader, e.market, e.cumulative_premium_fraction),
            EventPayload::PositionModified(e) | EventPayload::PositionLiquidated(e) => {
                store.update_position(e.trader, e.market, e.size, e.open_notional);
                store.update_last_price(e.market, e.price);
            }
        }

        if removed {
            store.retract_block(block);
        } else {
            store.note_block(block);
        }
        Ok(())
    }
}

// unsigned fill amount -> delta in the order's own sign convention
fn fill_delta(store: &Store, hash: OrderHash, amount: Decimal) -> Result<Decimal, StoreError> {
    let order = store.order(&hash).ok_or(StoreError::OrderNotFound(hash))?;
    Ok(order.side().sign() * amount)
}
