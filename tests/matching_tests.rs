//! Matching rounds, fill validation and liquidation discovery through the node API.

use perps_node_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MARKET: MarketId = MarketId(0);

fn exchange_with_spread(spread_limit: Decimal) -> Exchange {
    let mut config = EngineConfig::default();
    config.markets[0].spread_limit = spread_limit;
    Exchange::new(config).unwrap()
}

fn place(ex: &Exchange, trader: u64, quantity: Decimal, price: Decimal, block: u64) -> OrderHash {
    let params = OrderParams::limit(MARKET, Address::from_low_u64(trader), quantity, Price::new_unchecked(price), block * 1000 + trader);
    let hash = params.hash().unwrap();
    let report = ex.ingest(vec![LedgerEvent::new(block, trader as u32, EventPayload::OrderPlaced(OrderPlacedEvent { order: params }))]);
    assert_eq!(report.applied, 1);
    hash
}

fn open_position(ex: &Exchange, trader: u64, margin: Decimal, size: Decimal, open_notional: Decimal, price: Decimal) {
    let trader = Address::from_low_u64(trader);
    let mut events = vec![];
    if margin > Decimal::ZERO {
        events.push(LedgerEvent::new(1, 0, EventPayload::MarginAdded(MarginChangeEvent { trader, collateral: CollateralId::QUOTE, amount: margin })));
    }
    events.push(LedgerEvent::new(
        1,
        1,
        EventPayload::PositionModified(PositionChangeEvent { trader, market: MARKET, size, open_notional, price: Price::new_unchecked(price) }),
    ));
    ex.ingest_accepted(events);
}

#[test]
fn round_pairs_by_price_then_block() {
    let ex = exchange_with_spread(dec!(0.2));
    let l21 = place(&ex, 1, dec!(10), dec!(21), 2);
    let l20 = place(&ex, 2, dec!(10), dec!(20), 1);
    let s19 = place(&ex, 3, dec!(-10), dec!(19), 1);
    let s18 = place(&ex, 4, dec!(-10), dec!(18), 2);

    let round = ex.tick(MARKET).unwrap();
    assert!(round.liquidations.is_empty());
    let pairs: Vec<_> = round.fills.iter().map(|f| (f.long, f.short, f.fill_amount)).collect();
    assert_eq!(pairs, vec![(l21, s18, dec!(10)), (l20, s19, dec!(10))]);

    // the round is a proposal only
    assert_eq!(ex.long_orders(MARKET).len(), 2);
}

#[test]
fn confirmed_fills_leave_the_book() {
    let ex = exchange_with_spread(dec!(0.2));
    let long = place(&ex, 1, dec!(10), dec!(20), 1);
    let short = place(&ex, 2, dec!(-4), dec!(20), 1);
    let round = ex.tick(MARKET).unwrap();
    assert_eq!(round.fills.len(), 1);

    let fill = &round.fills[0];
    ex.ingest(vec![LedgerEvent::new(
        2,
        0,
        EventPayload::OrdersMatched(OrdersMatchedEvent {
            long_order: fill.long,
            short_order: fill.short,
            fill_amount: fill.fill_amount,
            price: Price::new_unchecked(dec!(20)),
        }),
    )]);
    assert!(ex.short_orders(MARKET).is_empty());
    assert_eq!(ex.long_orders(MARKET)[0].hash, long);
    assert_eq!(ex.long_orders(MARKET)[0].unfilled(), dec!(6));
    assert!(ex.tick(MARKET).unwrap().is_empty());
    assert_eq!(ex.store().read().order(&short).unwrap().status, OrderStatus::Filled);
}

#[test]
fn fill_below_band_is_too_low() {
    let ex = exchange_with_spread(dec!(0.5));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));
    let long = place(&ex, 1, dec!(1), dec!(9), 1);
    let short = place(&ex, 2, dec!(-1), dec!(8), 2);
    let err = ex.validate_orders(long, short, dec!(1)).unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::TooLow { .. })));
}

#[test]
fn equal_prices_fill_at_that_price_with_earlier_maker() {
    let ex = exchange_with_spread(dec!(0.5));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));
    let long = place(&ex, 1, dec!(1), dec!(15), 69);
    let short = place(&ex, 2, dec!(-1), dec!(15), 70);
    let ok = ex.validate_orders(long, short, dec!(1)).unwrap();
    assert_eq!(ok.fill_price, Price::new_unchecked(dec!(15)));
    assert_eq!((ok.long_role, ok.short_role), (OrderRole::Maker, OrderRole::Taker));
}

#[test]
fn maker_long_above_band_is_clamped() {
    let ex = exchange_with_spread(dec!(0.5));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));
    let long = place(&ex, 1, dec!(1), dec!(40), 1);
    let short = place(&ex, 2, dec!(-1), dec!(29), 2);
    let ok = ex.validate_orders(long, short, dec!(1)).unwrap();
    assert_eq!(ok.fill_price, Price::new_unchecked(dec!(30)));
}

#[test]
fn structural_checks_reject_bad_pairs() {
    let ex = exchange_with_spread(dec!(0.2));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));
    let long = place(&ex, 1, dec!(2), dec!(19), 1);
    let short = place(&ex, 2, dec!(-2), dec!(20), 1);
    let other_long = place(&ex, 3, dec!(1), dec!(21), 1);

    assert!(matches!(ex.validate_orders(long, short, dec!(1)), Err(EngineError::Validation(ValidationError::NoMatch { .. }))));
    assert!(matches!(ex.validate_orders(short, long, dec!(1)), Err(EngineError::Validation(ValidationError::NotLongOrder(_)))));
    assert!(matches!(ex.validate_orders(long, other_long, dec!(1)), Err(EngineError::Validation(ValidationError::NotShortOrder(_)))));
    assert!(matches!(
        ex.validate_orders(other_long, short, dec!(3)),
        Err(EngineError::Validation(ValidationError::InvalidFillAmount { .. }))
    ));
    assert!(matches!(
        ex.validate_orders(other_long, OrderHash([9; 32]), dec!(1)),
        Err(EngineError::Validation(ValidationError::OrderNotFound(_)))
    ));
}

#[test]
fn no_oracle_no_validation() {
    let ex = exchange_with_spread(dec!(0.2));
    let long = place(&ex, 1, dec!(1), dec!(20), 1);
    let short = place(&ex, 2, dec!(-1), dec!(20), 1);
    assert!(matches!(ex.validate_orders(long, short, dec!(1)), Err(EngineError::Validation(ValidationError::NoOraclePrice(_)))));
}

#[test]
fn underwater_trader_is_liquidable() {
    let ex = exchange_with_spread(dec!(0.2));
    open_position(&ex, 1, Decimal::ZERO, dec!(10), dec!(100), dec!(8));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(8)));

    let trader = Address::from_low_u64(1);
    let (notional, margin) = ex.notional_position_and_margin(&trader, true, MarginMode::Maintenance).unwrap();
    assert_eq!((notional, margin), (dec!(80), dec!(-20)));
    // negative fractions stay negative
    assert_eq!(ex.margin_fraction(&trader, MARKET, MarginMode::Maintenance).unwrap(), dec!(-0.25));

    let candidates = ex.liquidable(MARKET);
    assert_eq!(candidates.longs.len(), 1);
    assert_eq!(candidates.longs[0].trader, trader);
    assert_eq!(candidates.longs[0].size, dec!(10));
}

#[test]
fn most_undercollateralized_first() {
    let ex = exchange_with_spread(dec!(0.2));
    // mf 10 / 200 = 0.05 and 4 / 200 = 0.02
    open_position(&ex, 1, dec!(10), dec!(10), dec!(200), dec!(20));
    open_position(&ex, 2, dec!(4), dec!(10), dec!(200), dec!(20));
    open_position(&ex, 3, dec!(100), dec!(10), dec!(200), dec!(20));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));

    let candidates = ex.liquidable(MARKET);
    let order: Vec<_> = candidates.longs.iter().map(|c| (c.trader, c.margin_fraction)).collect();
    assert_eq!(order, vec![(Address::from_low_u64(2), dec!(0.02)), (Address::from_low_u64(1), dec!(0.05))]);
}

#[test]
fn tick_liquidates_then_matches_and_instructions_validate() {
    let ex = exchange_with_spread(dec!(0.2));
    open_position(&ex, 1, dec!(10), dec!(10), dec!(200), dec!(20));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));
    let bid = place(&ex, 2, dec!(15), dec!(19.5), 2);
    let low_bid = place(&ex, 3, dec!(5), dec!(18), 2);
    let ask = place(&ex, 4, dec!(-8), dec!(19), 3);

    let round = ex.tick(MARKET).unwrap();
    // 19.5 is inside the 5% band, 18 is not
    assert_eq!(round.liquidations.len(), 1);
    let liq = &round.liquidations[0];
    assert_eq!((liq.trader, liq.order, liq.fill_amount), (Address::from_low_u64(1), bid, dec!(10)));
    assert_eq!(round.fills, vec![FillInstruction { market: MARKET, long: bid, short: ask, fill_amount: dec!(5) }]);
    assert!(round.fills.iter().all(|f| f.long != low_bid));

    let validated = ex.validate_liquidation(liq.trader, liq.order, liq.fill_amount).unwrap();
    assert_eq!(validated.fill_price, Price::new_unchecked(dec!(19.5)));
    let fill = ex.validate_orders(bid, ask, dec!(5)).unwrap();
    // bid placed first: maker at its own price
    assert_eq!(fill.fill_price, Price::new_unchecked(dec!(19.5)));
}

#[test]
fn liquidation_against_wrong_side_rejected() {
    let ex = exchange_with_spread(dec!(0.2));
    open_position(&ex, 1, dec!(10), dec!(10), dec!(200), dec!(20));
    ex.set_oracle_price(MARKET, Price::new_unchecked(dec!(20)));
    let ask = place(&ex, 4, dec!(-8), dec!(20), 3);
    assert!(matches!(
        ex.validate_liquidation(Address::from_low_u64(1), ask, dec!(1)),
        Err(EngineError::Validation(ValidationError::NoPosition { .. }))
    ));
}
