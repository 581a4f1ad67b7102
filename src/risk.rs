//! Margin math under two price references.
//!
//! Every position can be marked at the last traded price or at the oracle
//! price. Maintenance checks (liquidation) take whichever gives the higher
//! margin fraction, so a trader is only unsafe when both prices agree.
//! Risk-increasing checks take the lower one.
//!
//! Margin fractions are plain ratios: 0.1 means effective margin is 10% of
//! notional. A flat position has no notional and reports `Decimal::MAX`.
//! Negative fractions are kept as is, so deeper insolvency sorts first.

use crate::margin::CollateralTable;
use crate::position::{notional, unrealized_pnl, Position};
use crate::store::Store;
use crate::types::{truncate_quote, Address, MarketId, Price, QUOTE_SCALE};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginMode {
    /// liquidation checks: higher of last/oracle margin fraction
    Maintenance,
    /// leverage increasing actions: lower of the two
    MinAllowable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// below this margin fraction a position can be liquidated
    pub maintenance_margin: Decimal,
    /// margin fraction required to add risk
    pub min_allowable_margin: Decimal,
    /// |last - oracle| / oracle at which the oracle price is also considered
    pub spread_ratio_threshold: Decimal,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            maintenance_margin: dec!(0.1),
            min_allowable_margin: dec!(0.2),
            spread_ratio_threshold: dec!(0.2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("no price available for {0}")]
    NoPrice(MarketId),

    #[error("{0} left the decimal range")]
    Overflow(&'static str),
}

fn checked(value: Option<Decimal>, what: &'static str) -> Result<Decimal, RiskError> {
    value.ok_or(RiskError::Overflow(what))
}

/// Notional, pnl and margin fraction of one position at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMetadata {
    pub notional: Decimal,
    pub unrealized_pnl: Decimal,
    pub margin_fraction: Decimal,
}

pub fn position_metadata(price: Price, position: &Position, margin: Decimal) -> Result<PositionMetadata, RiskError> {
    let notional = checked(notional(position.size, price), "notional")?;
    if notional.is_zero() {
        return Ok(PositionMetadata {
            notional,
            unrealized_pnl: Decimal::ZERO,
            margin_fraction: Decimal::MAX,
        });
    }
    let unrealized_pnl = checked(unrealized_pnl(position.size, position.open_notional, price), "unrealized pnl")?;
    let effective = checked(margin.checked_add(unrealized_pnl), "effective margin")?;
    Ok(PositionMetadata {
        notional,
        unrealized_pnl,
        margin_fraction: margin_fraction(effective, notional),
    })
}

// floor, matching euclidean integer division by a positive notional.
// a quotient past the decimal range saturates toward its sign.
pub fn margin_fraction(effective_margin: Decimal, notional: Decimal) -> Decimal {
    if notional.is_zero() {
        return Decimal::MAX;
    }
    match effective_margin.checked_div(notional) {
        Some(mf) => mf.round_dp_with_strategy(QUOTE_SCALE, RoundingStrategy::ToNegativeInfinity),
        None if effective_margin.is_sign_negative() => Decimal::MIN,
        None => Decimal::MAX,
    }
}

/// Truncated |last - oracle| / oracle.
pub fn spread_ratio(last: Price, oracle: Price) -> Decimal {
    (last.value() - oracle.value())
        .abs()
        .checked_div(oracle.value())
        .unwrap_or(Decimal::MAX)
        .round_dp_with_strategy(QUOTE_SCALE, RoundingStrategy::ToZero)
}

#[derive(Debug, Clone)]
pub struct RiskEngine {
    params: RiskParams,
    collaterals: CollateralTable,
}

impl RiskEngine {
    pub fn new(params: RiskParams, collaterals: CollateralTable) -> Self {
        Self { params, collaterals }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn collaterals(&self) -> &CollateralTable {
        &self.collaterals
    }

    pub fn normalized_margin(&self, store: &Store, trader: &Address) -> Result<Decimal, RiskError> {
        match store.margin(trader) {
            Some(margin) => checked(margin.normalized(&self.collaterals), "normalized margin"),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Unsettled funding summed over every market the trader holds.
    pub fn pending_funding(&self, store: &Store, trader: &Address) -> Result<Decimal, RiskError> {
        let total = match store.trader(trader) {
            Some(state) => state
                .positions
                .values()
                .try_fold(Decimal::ZERO, |sum, p| sum.checked_add(p.unrealized_funding)),
            None => Some(Decimal::ZERO),
        };
        checked(total, "pending funding")
    }

    /// Margin backing positions before pnl: normalized deposits less pending funding.
    pub fn margin_after_funding(&self, store: &Store, trader: &Address) -> Result<Decimal, RiskError> {
        let margin = self.normalized_margin(store, trader)?;
        checked(margin.checked_sub(self.pending_funding(store, trader)?), "margin after funding")
    }

    fn prices(&self, store: &Store, market: MarketId) -> Result<(Price, Price), RiskError> {
        let state = store.market(market).ok_or(RiskError::NoPrice(market))?;
        match (state.last_price, state.oracle_price) {
            (Some(last), Some(oracle)) => Ok((last, oracle)),
            (Some(only), None) | (None, Some(only)) => Ok((only, only)),
            (None, None) => Err(RiskError::NoPrice(market)),
        }
    }

    /// Notional and pnl of one position at the price the mode prefers.
    pub fn optimal_pnl(&self, store: &Store, trader: &Address, market: MarketId, margin: Decimal, mode: MarginMode) -> Result<(Decimal, Decimal), RiskError> {
        let position = match store.position(trader, market) {
            Some(p) if p.is_open() => p,
            _ => return Ok((Decimal::ZERO, Decimal::ZERO)),
        };
        let (last, oracle) = self.prices(store, market)?;
        let by_last = position_metadata(last, position, margin)?;
        let by_oracle = position_metadata(oracle, position, margin)?;
        let use_oracle = match mode {
            MarginMode::Maintenance => by_oracle.margin_fraction > by_last.margin_fraction,
            MarginMode::MinAllowable => by_oracle.margin_fraction < by_last.margin_fraction,
        };
        let chosen = if use_oracle { by_oracle } else { by_last };
        Ok((chosen.notional, chosen.unrealized_pnl))
    }

    /// Margin fraction of the trader's position in one market.
    pub fn margin_fraction(&self, store: &Store, trader: &Address, market: MarketId, mode: MarginMode) -> Result<Decimal, RiskError> {
        let margin = self.margin_after_funding(store, trader)?;
        let (notional, pnl) = self.optimal_pnl(store, trader, market, margin, mode)?;
        Ok(margin_fraction(checked(margin.checked_add(pnl), "effective margin")?, notional))
    }

    /// Total notional across markets and the margin backing it (pnl included).
    pub fn notional_position_and_margin(&self, store: &Store, trader: &Address, include_funding: bool, mode: MarginMode) -> Result<(Decimal, Decimal), RiskError> {
        let margin = if include_funding {
            self.margin_after_funding(store, trader)?
        } else {
            self.normalized_margin(store, trader)?
        };
        let mut total_notional = Decimal::ZERO;
        let mut total_pnl = Decimal::ZERO;
        if let Some(state) = store.trader(trader) {
            for market in state.positions.keys() {
                let (n, pnl) = self.optimal_pnl(store, trader, *market, margin, mode)?;
                total_notional = checked(total_notional.checked_add(n), "total notional")?;
                total_pnl = checked(total_pnl.checked_add(pnl), "total pnl")?;
            }
        }
        Ok((total_notional, checked(margin.checked_add(total_pnl), "effective margin")?))
    }

    /// Cross-market margin fraction.
    pub fn account_margin_fraction(&self, store: &Store, trader: &Address, mode: MarginMode) -> Result<Decimal, RiskError> {
        let (notional, margin) = self.notional_position_and_margin(store, trader, true, mode)?;
        Ok(margin_fraction(margin, notional))
    }

    /// Margin free for new orders: margin less the minimum requirement and reservations.
    pub fn available_margin(&self, store: &Store, trader: &Address) -> Result<Decimal, RiskError> {
        let (notional, margin) = self.notional_position_and_margin(store, trader, true, MarginMode::MinAllowable)?;
        let required = checked(notional.checked_mul(self.params.min_allowable_margin), "required margin").map(truncate_quote)?;
        let reserved = store.margin(trader).map(|m| m.reserved).unwrap_or(Decimal::ZERO);
        checked(margin.checked_sub(required).and_then(|m| m.checked_sub(reserved)), "available margin")
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(RiskParams::default(), CollateralTable::default())
    }
}
