// 6.0: liquidation candidate discovery. a position whose margin fraction is under
// maintenance goes on the list for its side, worst first.
// 6.1 last price is the reference. once last and oracle drift apart past the spread
// threshold the oracle based fraction is computed too and the higher one counts.
// a trader whose numbers leave the decimal range is skipped for the round.

use crate::position::Position;
use crate::risk::{position_metadata, spread_ratio, RiskEngine, RiskError};
use crate::store::Store;
use crate::types::{Address, MarketId, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidablePosition {
    pub trader: Address,
    pub market: MarketId,
    pub side: Side,
    /// absolute position size
    pub size: Decimal,
    pub margin_fraction: Decimal,
    /// how much of the position this round has already lined up to close
    pub filled_size: Decimal,
}

impl LiquidablePosition {
    pub fn unfilled(&self) -> Decimal {
        self.size - self.filled_size
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationCandidates {
    pub longs: Vec<LiquidablePosition>,
    pub shorts: Vec<LiquidablePosition>,
}

impl LiquidationCandidates {
    pub fn is_empty(&self) -> bool {
        self.longs.is_empty() && self.shorts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.longs.len() + self.shorts.len()
    }
}

impl RiskEngine {
    pub fn find_liquidable(&self, store: &Store, market: MarketId, oracle: Price) -> LiquidationCandidates {
        let last = store.last_price(market).unwrap_or(oracle);
        let over_spread = spread_ratio(last, oracle) >= self.params().spread_ratio_threshold;

        let mut candidates = LiquidationCandidates::default();
        for (trader, state) in store.traders() {
            let position = match state.positions.get(&market) {
                Some(p) if p.is_open() => p,
                _ => continue,
            };
            let mf = match self.scan_fraction(store, trader, position, last, over_spread.then_some(oracle)) {
                Ok(mf) => mf,
                Err(err) => {
                    warn!(%trader, %market, error = %err, "skipping trader in liquidation scan");
                    continue;
                }
            };
            if mf >= self.params().maintenance_margin {
                continue;
            }
            let side = if position.size > Decimal::ZERO { Side::Long } else { Side::Short };
            let entry = LiquidablePosition {
                trader: *trader,
                market,
                side,
                size: position.size.abs(),
                margin_fraction: mf,
                filled_size: Decimal::ZERO,
            };
            match side {
                Side::Long => candidates.longs.push(entry),
                Side::Short => candidates.shorts.push(entry),
            }
        }

        // stable: equal fractions keep discovery order
        candidates.longs.sort_by(|a, b| a.margin_fraction.cmp(&b.margin_fraction));
        candidates.shorts.sort_by(|a, b| a.margin_fraction.cmp(&b.margin_fraction));
        candidates
    }

    fn scan_fraction(&self, store: &Store, trader: &Address, position: &Position, last: Price, oracle: Option<Price>) -> Result<Decimal, RiskError> {
        let margin = self.margin_after_funding(store, trader)?;
        let mut mf = position_metadata(last, position, margin)?.margin_fraction;
        if let Some(oracle) = oracle {
            mf = mf.max(position_metadata(oracle, position, margin)?.margin_fraction);
        }
        Ok(mf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CollateralId;
    use rust_decimal_macros::dec;

    fn trader(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn price(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn underwater_trader_is_liquidable() {
        let mut store = Store::default();
        store.update_position(trader(1), MarketId(0), dec!(10), dec!(100));
        store.update_last_price(MarketId(0), price(dec!(8)));

        let found = RiskEngine::default().find_liquidable(&store, MarketId(0), price(dec!(8)));
        assert_eq!(found.longs.len(), 1);
        assert!(found.shorts.is_empty());
        let liq = &found.longs[0];
        assert_eq!(liq.trader, trader(1));
        assert_eq!(liq.size, dec!(10));
        assert_eq!(liq.margin_fraction, dec!(-0.25));
        assert_eq!(liq.filled_size, Decimal::ZERO);
    }

    #[test]
    fn worst_margin_fraction_first() {
        let mut store = Store::default();
        // short 10 @ 10 marked at 10, margin 5 -> 0.05 and margin 2 -> 0.02
        store.update_position(trader(1), MarketId(0), dec!(-10), dec!(100));
        store.update_margin(trader(1), CollateralId::QUOTE, dec!(5)).unwrap();
        store.update_position(trader(2), MarketId(0), dec!(-10), dec!(100));
        store.update_margin(trader(2), CollateralId::QUOTE, dec!(2)).unwrap();
        store.update_last_price(MarketId(0), price(dec!(10)));

        let found = RiskEngine::default().find_liquidable(&store, MarketId(0), price(dec!(10)));
        let order: Vec<_> = found.shorts.iter().map(|l| (l.trader, l.margin_fraction)).collect();
        assert_eq!(order, vec![(trader(2), dec!(0.02)), (trader(1), dec!(0.05))]);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let mut store = Store::default();
        for n in [3, 1, 2] {
            store.update_position(trader(n), MarketId(0), dec!(1), dec!(10));
        }
        store.update_last_price(MarketId(0), price(dec!(10)));
        let found = RiskEngine::default().find_liquidable(&store, MarketId(0), price(dec!(10)));
        let traders: Vec<_> = found.longs.iter().map(|l| l.trader).collect();
        assert_eq!(traders, vec![trader(1), trader(2), trader(3)]);
    }

    #[test]
    fn oracle_rescues_only_past_spread_threshold() {
        // long 10 @ 10, margin 5. last 9: (5-10)/90 < 0. oracle 10: 5/100 = 0.05, still unsafe
        let mut store = Store::default();
        store.update_position(trader(1), MarketId(0), dec!(10), dec!(100));
        store.update_margin(trader(1), CollateralId::QUOTE, dec!(5)).unwrap();
        store.update_last_price(MarketId(0), price(dec!(9)));
        let risk = RiskEngine::default();
        let found = risk.find_liquidable(&store, MarketId(0), price(dec!(10)));
        assert_eq!(found.longs[0].margin_fraction, dec!(-0.055556));

        // last 7 vs oracle 10 is a 30% spread: oracle fraction (5+0)/100 wins
        store.update_last_price(MarketId(0), price(dec!(7)));
        let found = risk.find_liquidable(&store, MarketId(0), price(dec!(10)));
        assert_eq!(found.longs[0].margin_fraction, dec!(0.05));

        // with margin 15 the oracle view is safe and the trader drops out
        store.update_margin(trader(1), CollateralId::QUOTE, dec!(10)).unwrap();
        let found = risk.find_liquidable(&store, MarketId(0), price(dec!(10)));
        assert!(found.is_empty());
    }

    #[test]
    fn healthy_and_flat_positions_skipped() {
        let mut store = Store::default();
        store.update_position(trader(1), MarketId(0), dec!(1), dec!(10));
        store.update_margin(trader(1), CollateralId::QUOTE, dec!(100)).unwrap();
        store.update_position(trader(2), MarketId(0), Decimal::ZERO, Decimal::ZERO);
        store.update_position(trader(3), MarketId(1), dec!(5), dec!(500));
        store.update_last_price(MarketId(0), price(dec!(10)));
        let found = RiskEngine::default().find_liquidable(&store, MarketId(0), price(dec!(10)));
        assert!(found.is_empty());
    }

    #[test]
    fn oversized_position_skipped_not_fatal() {
        let mut store = Store::default();
        store.update_position(trader(1), MarketId(0), dec!(100000000000000000000), dec!(1));
        store.update_position(trader(2), MarketId(0), dec!(10), dec!(200000000000));
        store.update_last_price(MarketId(0), price(dec!(10000000000)));

        let found = RiskEngine::default().find_liquidable(&store, MarketId(0), price(dec!(10000000000)));
        let traders: Vec<_> = found.longs.iter().map(|l| l.trader).collect();
        assert_eq!(traders, vec![trader(2)]);
    }
}
