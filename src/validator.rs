// 10.0 validator.rs: fill price and maker/taker for a matched pair.
// every fill is pinned to an oracle anchored band [oracle*(1-s), oracle*(1+s)].
// the earlier placed order is the maker and its price, clamped into the band, is the
// fill price. equal blocks make the short the maker.
// 10.1 liquidation fills use a tighter band to accept the order, the normal band to price it.
// 10.2 FillValidator checks a proposed match against the store before pricing it.

use crate::market::{MarketParams, MarketRegistry};
use crate::order::{Order, OrderStatus};
use crate::store::Store;
use crate::types::{truncate_quote, Address, BlockNumber, MarketId, OrderHash, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderRole {
    Taker = 0,
    Maker = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("long price {price} below lower bound {bound}")]
    TooLow { price: Price, bound: Decimal },

    #[error("short price {price} above upper bound {bound}")]
    TooHigh { price: Price, bound: Decimal },

    #[error("order {0} is not a long order")]
    NotLongOrder(OrderHash),

    #[error("order {0} is not a short order")]
    NotShortOrder(OrderHash),

    #[error("orders belong to different markets: {long} and {short}")]
    NotSameMarket { long: MarketId, short: MarketId },

    #[error("long price {long} below short price {short}")]
    NoMatch { long: Price, short: Price },

    #[error("order {0} not found")]
    OrderNotFound(OrderHash),

    #[error("order {hash} is {status:?}, not placed")]
    OrderNotPlaced { hash: OrderHash, status: OrderStatus },

    #[error("fill amount {amount} invalid, {available} available")]
    InvalidFillAmount { amount: Decimal, available: Decimal },

    #[error("no oracle price for {0}")]
    NoOraclePrice(MarketId),

    #[error("trader {trader} has no {side:?} position in {market}")]
    NoPosition { trader: Address, market: MarketId, side: Side },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPriceOutcome {
    pub fill_price: Price,
    pub long_role: OrderRole,
    pub short_role: OrderRole,
}

/// (upper, lower) band around the oracle. lower bottoms out at zero, upper tops
/// out at `Decimal::MAX`.
pub fn price_bounds(oracle: Price, spread: Decimal) -> (Decimal, Decimal) {
    let upper = oracle
        .value()
        .checked_mul(Decimal::ONE + spread)
        .map_or(Decimal::MAX, truncate_quote);
    let lower = if spread < Decimal::ONE {
        truncate_quote(oracle.value() * (Decimal::ONE - spread))
    } else {
        Decimal::ZERO
    };
    (upper, lower)
}

// clamped values stay inside a band around a positive oracle, except a zero lower bound
fn to_price(value: Decimal, fallback: Price) -> Price {
    Price::new(value).unwrap_or(fallback)
}

pub fn determine_fill_price(
    oracle: Price,
    spread_limit: Decimal,
    long_price: Price,
    short_price: Price,
    long_block: BlockNumber,
    short_block: BlockNumber,
) -> Result<FillPriceOutcome, ValidationError> {
    let (upper, lower) = price_bounds(oracle, spread_limit);
    if long_price.value() < lower {
        return Err(ValidationError::TooLow { price: long_price, bound: lower });
    }
    if short_price.value() > upper {
        return Err(ValidationError::TooHigh { price: short_price, bound: upper });
    }

    if long_block < short_block {
        Ok(FillPriceOutcome {
            fill_price: to_price(long_price.value().min(upper), long_price),
            long_role: OrderRole::Maker,
            short_role: OrderRole::Taker,
        })
    } else {
        Ok(FillPriceOutcome {
            fill_price: to_price(short_price.value().max(lower), short_price),
            long_role: OrderRole::Taker,
            short_role: OrderRole::Maker,
        })
    }
}

/// Price at which a liquidated position of `side` trades against a resting order
/// of the same side.
pub fn determine_liquidation_fill_price(
    oracle: Price,
    params: &MarketParams,
    order_price: Price,
    side: Side,
) -> Result<Price, ValidationError> {
    let (liq_upper, liq_lower) = price_bounds(oracle, params.liquidation_spread_limit);
    let (upper, lower) = price_bounds(oracle, params.spread_limit);
    match side {
        Side::Long => {
            if order_price.value() < liq_lower {
                return Err(ValidationError::TooLow { price: order_price, bound: liq_lower });
            }
            Ok(to_price(order_price.value().min(upper), order_price))
        }
        Side::Short => {
            if order_price.value() > liq_upper {
                return Err(ValidationError::TooHigh { price: order_price, bound: liq_upper });
            }
            Ok(to_price(order_price.value().max(lower), order_price))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMatch {
    pub market: MarketId,
    pub long: OrderHash,
    pub short: OrderHash,
    pub fill_amount: Decimal,
    pub fill_price: Price,
    pub long_role: OrderRole,
    pub short_role: OrderRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLiquidation {
    pub market: MarketId,
    pub trader: Address,
    pub order: OrderHash,
    pub fill_amount: Decimal,
    pub fill_price: Price,
}

/// Read-only checks of proposed fills against a store snapshot.
pub struct FillValidator<'a> {
    store: &'a Store,
    markets: &'a MarketRegistry,
}

impl<'a> FillValidator<'a> {
    pub fn new(store: &'a Store, markets: &'a MarketRegistry) -> Self {
        Self { store, markets }
    }

    fn placed_order(&self, hash: OrderHash) -> Result<&'a Order, ValidationError> {
        let order = self.store.order(&hash).ok_or(ValidationError::OrderNotFound(hash))?;
        if order.status != OrderStatus::Placed {
            return Err(ValidationError::OrderNotPlaced { hash, status: order.status });
        }
        Ok(order)
    }

    fn oracle(&self, market: MarketId) -> Result<Price, ValidationError> {
        self.store.oracle_price(market).ok_or(ValidationError::NoOraclePrice(market))
    }

    pub fn validate_orders(&self, long: OrderHash, short: OrderHash, fill_amount: Decimal) -> Result<ValidatedMatch, ValidationError> {
        let long_order = self.placed_order(long)?;
        let short_order = self.placed_order(short)?;
        if !long_order.is_long() {
            return Err(ValidationError::NotLongOrder(long));
        }
        if long_order.is_long() == short_order.is_long() {
            return Err(ValidationError::NotShortOrder(short));
        }
        if long_order.market != short_order.market {
            return Err(ValidationError::NotSameMarket {
                long: long_order.market,
                short: short_order.market,
            });
        }
        if long_order.price < short_order.price {
            return Err(ValidationError::NoMatch {
                long: long_order.price,
                short: short_order.price,
            });
        }
        let available = long_order.unfilled_abs().min(short_order.unfilled_abs());
        if fill_amount <= Decimal::ZERO || fill_amount > available {
            return Err(ValidationError::InvalidFillAmount { amount: fill_amount, available });
        }

        let market = long_order.market;
        let params = self.markets.get(market);
        let outcome = determine_fill_price(
            self.oracle(market)?,
            params.spread_limit,
            long_order.price,
            short_order.price,
            long_order.block_placed,
            short_order.block_placed,
        )?;
        Ok(ValidatedMatch {
            market,
            long,
            short,
            fill_amount,
            fill_price: outcome.fill_price,
            long_role: outcome.long_role,
            short_role: outcome.short_role,
        })
    }

    pub fn validate_liquidation(&self, trader: Address, order: OrderHash, fill_amount: Decimal) -> Result<ValidatedLiquidation, ValidationError> {
        let resting = self.placed_order(order)?;
        let market = resting.market;
        let side = resting.side();
        let position_size = match self.store.position(&trader, market) {
            Some(p) if Side::of(p.size) == Some(side) => p.size.abs(),
            _ => return Err(ValidationError::NoPosition { trader, market, side }),
        };
        let available = resting.unfilled_abs().min(position_size);
        if fill_amount <= Decimal::ZERO || fill_amount > available {
            return Err(ValidationError::InvalidFillAmount { amount: fill_amount, available });
        }

        let params = self.markets.get(market);
        let fill_price = determine_liquidation_fill_price(self.oracle(market)?, &params, resting.price, side)?;
        Ok(ValidatedLiquidation {
            market,
            trader,
            order,
            fill_amount,
            fill_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderParams;
    use rust_decimal_macros::dec;

    fn price(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn fill(long: Decimal, short: Decimal, long_block: u64, short_block: u64) -> Result<FillPriceOutcome, ValidationError> {
        determine_fill_price(price(dec!(20)), dec!(0.5), price(long), price(short), long_block, short_block)
    }

    #[test]
    fn bounds_around_oracle() {
        assert_eq!(price_bounds(price(dec!(20)), dec!(0.5)), (dec!(30), dec!(10)));
        assert_eq!(price_bounds(price(dec!(20)), dec!(1.5)), (dec!(50), Decimal::ZERO));
        assert_eq!(price_bounds(price(Decimal::MAX), dec!(0.5)).0, Decimal::MAX);
    }

    #[test]
    fn long_below_band_is_too_low() {
        assert!(matches!(fill(dec!(9), dec!(8), 69, 70), Err(ValidationError::TooLow { .. })));
        assert!(matches!(fill(dec!(9), dec!(8), 70, 69), Err(ValidationError::TooLow { .. })));
    }

    #[test]
    fn short_above_band_is_too_high() {
        assert!(matches!(fill(dec!(35), dec!(31), 69, 70), Err(ValidationError::TooHigh { .. })));
    }

    #[test]
    fn earlier_order_is_maker() {
        let out = fill(dec!(15), dec!(15), 69, 70).unwrap();
        assert_eq!(out.fill_price, price(dec!(15)));
        assert_eq!((out.long_role, out.short_role), (OrderRole::Maker, OrderRole::Taker));

        let out = fill(dec!(15), dec!(15), 70, 69).unwrap();
        assert_eq!(out.fill_price, price(dec!(15)));
        assert_eq!((out.long_role, out.short_role), (OrderRole::Taker, OrderRole::Maker));
    }

    #[test]
    fn same_block_makes_short_the_maker() {
        let out = fill(dec!(25), dec!(21), 70, 70).unwrap();
        assert_eq!(out.fill_price, price(dec!(21)));
        assert_eq!(out.short_role, OrderRole::Maker);
    }

    #[test]
    fn maker_price_clamped_into_band() {
        let out = fill(dec!(40), dec!(29), 69, 70).unwrap();
        assert_eq!(out.fill_price, price(dec!(30)));

        let out = fill(dec!(40), dec!(29), 70, 69).unwrap();
        assert_eq!(out.fill_price, price(dec!(29)));

        let out = fill(dec!(25), dec!(5), 70, 69).unwrap();
        assert_eq!(out.fill_price, price(dec!(10)));
    }

    #[test]
    fn role_encoding() {
        assert_eq!(OrderRole::Taker as u8, 0);
        assert_eq!(OrderRole::Maker as u8, 1);
    }

    #[test]
    fn liquidation_price_band() {
        let params = MarketParams { id: MarketId(0), spread_limit: dec!(0.5), liquidation_spread_limit: dec!(0.1) };
        let oracle = price(dec!(20));
        // long liquidation needs a long order at or above 18
        assert!(matches!(
            determine_liquidation_fill_price(oracle, &params, price(dec!(17.99)), Side::Long),
            Err(ValidationError::TooLow { .. })
        ));
        assert_eq!(determine_liquidation_fill_price(oracle, &params, price(dec!(19)), Side::Long).unwrap(), price(dec!(19)));
        assert_eq!(determine_liquidation_fill_price(oracle, &params, price(dec!(35)), Side::Long).unwrap(), price(dec!(30)));
        // short liquidation needs a short order at or below 22
        assert!(matches!(
            determine_liquidation_fill_price(oracle, &params, price(dec!(22.01)), Side::Short),
            Err(ValidationError::TooHigh { .. })
        ));
        assert_eq!(determine_liquidation_fill_price(oracle, &params, price(dec!(21)), Side::Short).unwrap(), price(dec!(21)));
    }

    fn store_with_orders() -> (Store, OrderHash, OrderHash) {
        let mut store = Store::default();
        let trader = Address::from_low_u64(1);
        let long = Order::new(OrderParams::limit(MarketId(0), trader, dec!(10), price(dec!(21)), 1), 5).unwrap();
        let short = Order::new(OrderParams::limit(MarketId(0), trader, dec!(-4), price(dec!(20)), 2), 6).unwrap();
        let (l, s) = (long.hash, short.hash);
        store.add_order(long).unwrap();
        store.add_order(short).unwrap();
        store.set_oracle_price(MarketId(0), price(dec!(20)));
        (store, l, s)
    }

    #[test]
    fn validator_accepts_crossing_pair() {
        let (store, long, short) = store_with_orders();
        let markets = MarketRegistry::default();
        let validated = FillValidator::new(&store, &markets).validate_orders(long, short, dec!(4)).unwrap();
        assert_eq!(validated.fill_price, price(dec!(21)));
        assert_eq!(validated.long_role, OrderRole::Maker);
    }

    #[test]
    fn validator_rejects_bad_pairs() {
        let (store, long, short) = store_with_orders();
        let markets = MarketRegistry::default();
        let v = FillValidator::new(&store, &markets);
        assert_eq!(v.validate_orders(short, long, dec!(1)), Err(ValidationError::NotLongOrder(short)));
        assert_eq!(v.validate_orders(long, long, dec!(1)), Err(ValidationError::NotShortOrder(long)));
        assert!(matches!(v.validate_orders(long, short, dec!(5)), Err(ValidationError::InvalidFillAmount { .. })));
        assert!(matches!(v.validate_orders(long, short, dec!(0)), Err(ValidationError::InvalidFillAmount { .. })));
        let missing = OrderHash([9; 32]);
        assert_eq!(v.validate_orders(long, missing, dec!(1)), Err(ValidationError::OrderNotFound(missing)));
    }

    #[test]
    fn validator_rejects_non_crossing_and_cross_market() {
        let mut store = Store::default();
        let trader = Address::from_low_u64(1);
        let long = Order::new(OrderParams::limit(MarketId(0), trader, dec!(1), price(dec!(19)), 1), 1).unwrap();
        let short = Order::new(OrderParams::limit(MarketId(0), trader, dec!(-1), price(dec!(20)), 2), 1).unwrap();
        let other = Order::new(OrderParams::limit(MarketId(1), trader, dec!(-1), price(dec!(18)), 3), 1).unwrap();
        let (l, s, o) = (long.hash, short.hash, other.hash);
        for order in [long, short, other] {
            store.add_order(order).unwrap();
        }
        let markets = MarketRegistry::default();
        let v = FillValidator::new(&store, &markets);
        assert!(matches!(v.validate_orders(l, s, dec!(1)), Err(ValidationError::NoMatch { .. })));
        assert!(matches!(v.validate_orders(l, o, dec!(1)), Err(ValidationError::NotSameMarket { .. })));
    }

    #[test]
    fn liquidation_needs_matching_position() {
        let (mut store, long, _) = store_with_orders();
        let markets = MarketRegistry::default();
        let victim = Address::from_low_u64(7);
        {
            let v = FillValidator::new(&store, &markets);
            assert!(matches!(v.validate_liquidation(victim, long, dec!(1)), Err(ValidationError::NoPosition { .. })));
        }
        store.update_position(victim, MarketId(0), dec!(3), dec!(60));
        let v = FillValidator::new(&store, &markets);
        let liq = v.validate_liquidation(victim, long, dec!(3)).unwrap();
        assert_eq!(liq.fill_price, price(dec!(21)));
        assert!(matches!(v.validate_liquidation(victim, long, dec!(4)), Err(ValidationError::InvalidFillAmount { .. })));
    }
}
