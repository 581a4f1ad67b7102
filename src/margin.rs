//! Trader margin accounts.
//!
//! A trader can post several collaterals. Risk math works on the normalized
//! margin: every deposit valued at its collateral price and haircut by its
//! weight. Reserved margin is earmarked for resting orders.

use crate::types::{truncate_quote, CollateralId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margin {
    pub deposited: BTreeMap<CollateralId, Decimal>,
    pub reserved: Decimal,
}

impl Margin {
    pub fn deposited(&self, collateral: CollateralId) -> Decimal {
        self.deposited.get(&collateral).copied().unwrap_or(Decimal::ZERO)
    }

    /// New balance of `collateral`, or `None` on overflow with nothing changed.
    #[must_use]
    pub fn apply_delta(&mut self, collateral: CollateralId, delta: Decimal) -> Option<Decimal> {
        let balance = self.deposited(collateral).checked_add(delta)?;
        self.deposited.insert(collateral, balance);
        Some(balance)
    }

    #[must_use]
    pub fn apply_reserved_delta(&mut self, delta: Decimal) -> Option<Decimal> {
        self.reserved = self.reserved.checked_add(delta)?;
        Some(self.reserved)
    }

    /// `None` when the valuation leaves the decimal range.
    pub fn normalized(&self, table: &CollateralTable) -> Option<Decimal> {
        self.deposited
            .iter()
            .try_fold(Decimal::ZERO, |total, (id, amount)| total.checked_add(table.value_of(*id, *amount)?))
    }
}

/// 3.1: price and haircut weight of one collateral kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralSpec {
    pub id: CollateralId,
    pub price: Decimal,
    pub weight: Decimal,
}

/// Registered collaterals. Unknown collateral counts for nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollateralTable {
    specs: BTreeMap<CollateralId, CollateralSpec>,
}

impl CollateralTable {
    pub fn new(specs: impl IntoIterator<Item = CollateralSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn get(&self, id: CollateralId) -> Option<&CollateralSpec> {
        self.specs.get(&id)
    }

    pub fn value_of(&self, id: CollateralId, amount: Decimal) -> Option<Decimal> {
        match self.specs.get(&id) {
            Some(spec) => amount.checked_mul(spec.price)?.checked_mul(spec.weight).map(truncate_quote),
            None => Some(Decimal::ZERO),
        }
    }
}

impl Default for CollateralTable {
    // quote stablecoin only, at par
    fn default() -> Self {
        Self::new([CollateralSpec {
            id: CollateralId::QUOTE,
            price: Decimal::ONE,
            weight: Decimal::ONE,
        }])
    }
}
