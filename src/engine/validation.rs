//! Fill checks against the current store, for validators of proposed matches.

use super::core::Exchange;
use super::results::EngineError;
use crate::types::{Address, OrderHash};
use crate::validator::{FillValidator, ValidatedLiquidation, ValidatedMatch};
use rust_decimal::Decimal;

impl Exchange {
    pub fn validate_orders(&self, long: OrderHash, short: OrderHash, fill_amount: Decimal) -> Result<ValidatedMatch, EngineError> {
        let store = self.store.read();
        Ok(FillValidator::new(&store, &self.markets).validate_orders(long, short, fill_amount)?)
    }

    pub fn validate_liquidation(&self, trader: Address, order: OrderHash, fill_amount: Decimal) -> Result<ValidatedLiquidation, EngineError> {
        let store = self.store.read();
        Ok(FillValidator::new(&store, &self.markets).validate_liquidation(trader, order, fill_amount)?)
    }
}
