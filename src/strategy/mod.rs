pub mod combo;
pub mod dca;
pub mod grid;

pub use combo::{ComboEngine, ComboMode};
pub use dca::{DcaEngine, DcaState};
pub use grid::{GridEngine, GridLevel, LevelId};

use crate::data::Candle;
use crate::engine::execution::{SimulatedOrder, Venue};
use crate::metrics::calculate_returns;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

//what one engine step produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub orders: Vec<SimulatedOrder>,
    pub realized_pnl: f64,
}

impl StepReport {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    //folds another step's output into this one
    pub fn merge(&mut self, other: StepReport) {
        self.orders.extend(other.orders);
        self.realized_pnl += other.realized_pnl;
    }
}

//running trade counters of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeTally {
    pub trade_count: usize,
    pub win_count: usize,
    pub total_fees: f64,
    pub realized_pnl: f64,
}

impl TradeTally {
    pub fn combine(self, other: TradeTally) -> TradeTally {
        TradeTally {
            trade_count: self.trade_count + other.trade_count,
            win_count: self.win_count + other.win_count,
            total_fees: self.total_fees + other.total_fees,
            realized_pnl: self.realized_pnl + other.realized_pnl,
        }
    }
}

//read-only snapshot served to status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub strategy: String,
    pub symbol: String,
    pub position_quantity: f64,
    pub tally: TradeTally,
}

//strategy engine interface shared by the backtest runner and the live bot
pub trait StrategyEngine: Send + Sync {
    //returns the strategy name
    fn name(&self) -> &str;

    fn symbol(&self) -> &str;

    //evaluates one candle (or one live tick) and routes orders to the venue
    fn on_candle(&mut self, candle: &Candle, fee_rate: f64, venue: &mut dyn Venue) -> StepReport;

    //quantity currently held by the engine
    fn position_quantity(&self) -> f64;

    //trade counters, with wins judged at the given mark price where needed
    fn tally(&self, mark_price: f64) -> TradeTally;

    fn status(&self, mark_price: f64) -> EngineStatus {
        EngineStatus {
            strategy: self.name().to_string(),
            symbol: self.symbol().to_string(),
            position_quantity: self.position_quantity(),
            tally: self.tally(mark_price),
        }
    }
}

//average true range over the last `period` candles
//needs period + 1 candles for the first previous close
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let recent = &candles[candles.len() - period - 1..];
    let total: f64 = recent
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .sum();

    Some(total / period as f64)
}

//population stddev of step returns over a price window
pub fn return_volatility(prices: &[f64]) -> f64 {
    let returns = calculate_returns(prices);
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.as_slice().population_std_dev();
    if std_dev.is_finite() {
        std_dev
    } else {
        0.0
    }
}

//fractional change from the first to the last price of a window
//the difference is taken before dividing so whole-percent moves stay exact
pub fn pct_change(prices: &[f64]) -> Option<f64> {
    match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if first != 0.0 => Some((last - first) / first),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(rows: &[(f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                Candle::new_unchecked(start + Duration::hours(i as i64), close, high, low, close, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_atr_needs_period_plus_one() {
        let data = candles(&[(11.0, 9.0, 10.0), (12.0, 10.0, 11.0)]);
        assert!(atr(&data, 2).is_none());
        assert_relative_eq!(atr(&data, 1).unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_atr_uses_gaps() {
        //second candle gaps up from 10 to a 14-15 range
        let data = candles(&[(11.0, 9.0, 10.0), (15.0, 14.0, 14.5), (15.0, 13.0, 14.0)]);
        //true ranges: 5.0 and 2.0
        assert_relative_eq!(atr(&data, 2).unwrap(), 3.5, epsilon = 1e-9);
    }

    #[test]
    fn test_pct_change_and_volatility() {
        assert_relative_eq!(pct_change(&[100.0, 90.0, 125.0]).unwrap(), 0.25, epsilon = 1e-9);
        assert!(pct_change(&[]).is_none());
        assert_eq!(pct_change(&[100.0, 110.0]), Some(0.10));
        assert_eq!(pct_change(&[100.0, 90.0]), Some(-0.10));
        assert_eq!(return_volatility(&[100.0, 100.0, 100.0]), 0.0);
        assert!(return_volatility(&[100.0, 110.0, 99.0]) > 0.0);
    }
}
