// 4.0: per (trader, market) position as last reported by the clearing house.
// size and open notional are set wholesale by ledger events, never derived locally.
// 4.1 has the notional/pnl helpers the risk engine builds on. they return None once a
// product leaves the decimal range; ledger values are only bounded by that range.

use crate::types::{truncate_quote, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// positive = long, negative = short. zero is a valid terminal value.
    pub size: Decimal,
    /// cost basis in quote, always non-negative
    pub open_notional: Decimal,
    pub last_premium_fraction: Decimal,
    pub unrealized_funding: Decimal,
}

impl Position {
    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        Side::of(self.size)
    }

    pub fn notional_at(&self, price: Price) -> Option<Decimal> {
        notional(self.size, price)
    }

    pub fn unrealized_pnl_at(&self, price: Price) -> Option<Decimal> {
        unrealized_pnl(self.size, self.open_notional, price)
    }

    // 4.2: funding owed since the last settlement. positive = trader pays.
    pub fn funding_owed(&self, cumulative_premium_fraction: Decimal) -> Option<Decimal> {
        cumulative_premium_fraction
            .checked_sub(self.last_premium_fraction)?
            .checked_mul(self.size)
            .map(truncate_quote)
    }

    pub fn settle_funding(&mut self, premium_fraction: Decimal) {
        self.unrealized_funding = Decimal::ZERO;
        self.last_premium_fraction = premium_fraction;
    }
}

// 4.1: |size| * price, truncated to quote precision
pub fn notional(size: Decimal, price: Price) -> Option<Decimal> {
    size.checked_mul(price.value()).map(|n| truncate_quote(n.abs()))
}

// long: notional - open, short: open - notional. flat positions have none.
pub fn unrealized_pnl(size: Decimal, open_notional: Decimal, price: Price) -> Option<Decimal> {
    let current = notional(size, price)?;
    match Side::of(size) {
        Some(Side::Long) => current.checked_sub(open_notional),
        Some(Side::Short) => open_notional.checked_sub(current),
        None => Some(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn long_loses_when_price_falls() {
        let pos = Position { size: dec!(10), open_notional: dec!(100), ..Default::default() };
        assert_eq!(pos.notional_at(price(dec!(8))), Some(dec!(80)));
        assert_eq!(pos.unrealized_pnl_at(price(dec!(8))), Some(dec!(-20)));
    }

    #[test]
    fn short_gains_when_price_falls() {
        let pos = Position { size: dec!(-10), open_notional: dec!(100), ..Default::default() };
        assert_eq!(pos.notional_at(price(dec!(8))), Some(dec!(80)));
        assert_eq!(pos.unrealized_pnl_at(price(dec!(8))), Some(dec!(20)));
    }

    #[test]
    fn flat_position_has_no_pnl() {
        assert_eq!(unrealized_pnl(Decimal::ZERO, dec!(5), price(dec!(10))), Some(Decimal::ZERO));
    }

    #[test]
    fn notional_truncates_to_quote_precision() {
        assert_eq!(notional(dec!(0.333333333), price(dec!(3))), Some(dec!(0.999999)));
    }

    #[test]
    fn oversized_position_has_no_notional() {
        let pos = Position { size: dec!(100000000000000000000), open_notional: dec!(1), ..Default::default() };
        assert_eq!(pos.notional_at(price(dec!(10000000000))), None);
        assert_eq!(pos.unrealized_pnl_at(price(dec!(10000000000))), None);
        // fits, but the short side subtraction does not
        assert_eq!(unrealized_pnl(dec!(-1), Decimal::MIN, price(dec!(1))), None);
    }

    #[test]
    fn funding_accrues_against_last_settlement() {
        let mut pos = Position { size: dec!(-2), last_premium_fraction: dec!(0.5), ..Default::default() };
        assert_eq!(pos.funding_owed(dec!(1.25)), Some(dec!(-1.5)));
        assert_eq!(pos.funding_owed(Decimal::MAX), None);

        pos.settle_funding(dec!(1.25));
        assert_eq!(pos.unrealized_funding, Decimal::ZERO);
        assert_eq!(pos.last_premium_fraction, dec!(1.25));
    }
}
