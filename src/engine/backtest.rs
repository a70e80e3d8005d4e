use crate::data::Candle;
use crate::engine::execution::SimulatedOrder;
use crate::metrics::{calculate_equity_curve, EquityPoint, EquitySample, PerformanceMetrics};
use crate::portfolio::Ledger;
use crate::strategy::{StrategyEngine, TradeTally};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

//result of a backtest
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategy: String,
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<EquitySample>,
    pub orders: Vec<SimulatedOrder>,
    pub tally: TradeTally,
    pub period: Duration,
    pub final_cash: f64,
    //pnl booked by the ledger at average cost, closed and still open at the last close
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

impl BacktestResult {
    //equity curve annotated with drawdowns and step returns
    pub fn equity_points(&self) -> Vec<EquityPoint> {
        calculate_equity_curve(&self.equity_curve)
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|sample| sample.equity)
    }
}

//account settings shared by every run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub fee_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 10000.0,
            fee_rate: 0.001,
        }
    }
}

//drives one engine candle by candle against a fresh ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestRunner {
    config: BacktestConfig,
}

impl BacktestRunner {
    pub fn new(config: BacktestConfig) -> Self {
        BacktestRunner { config }
    }

    //runs the engine over the candles inside [start, end]
    pub fn run(
        &self,
        candles: &[Candle],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        engine: &mut dyn StrategyEngine,
    ) -> BacktestResult {
        let mut ledger = Ledger::new(self.config.initial_capital);
        let mut equity_curve = Vec::new();
        let mut last_close = None;
        let symbol = engine.symbol().to_string();

        //main backtest loop
        for candle in candles {
            if !candle.within(start, end) {
                continue;
            }

            let report = engine.on_candle(candle, self.config.fee_rate, &mut ledger);
            if !report.is_empty() {
                debug!(
                    timestamp = %candle.timestamp,
                    orders = report.orders.len(),
                    realized = report.realized_pnl,
                    "step executed"
                );
            }

            //record equity
            equity_curve.push(EquitySample::new(
                candle.timestamp,
                ledger.equity(&symbol, candle.close),
            ));
            last_close = Some(candle.close);
        }

        let period = end - start;
        let tally = match last_close {
            Some(close) => engine.tally(close),
            None => TradeTally::default(),
        };

        let metrics = PerformanceMetrics::from_curve(
            &equity_curve,
            period,
            tally.trade_count,
            tally.win_count,
            ledger.total_fees,
        );

        info!(
            strategy = engine.name(),
            candles = equity_curve.len(),
            trades = tally.trade_count,
            total_return_pct = metrics.total_return_pct,
            "backtest finished"
        );

        let unrealized_pnl = last_close
            .map(|close| ledger.unrealized_pnl(&symbol, close))
            .unwrap_or(0.0);

        BacktestResult {
            strategy: engine.name().to_string(),
            metrics,
            equity_curve,
            realized_pnl: ledger.total_realized_pnl(),
            unrealized_pnl,
            orders: ledger.trade_log,
            tally,
            period,
            final_cash: ledger.cash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DcaConfig, GridConfig};
    use crate::strategy::{DcaEngine, GridEngine};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn series(prices: &[f64]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Candle::from_price(t(i as i64), price))
            .collect()
    }

    fn runner(capital: f64) -> BacktestRunner {
        BacktestRunner::new(BacktestConfig {
            initial_capital: capital,
            fee_rate: 0.0,
        })
    }

    #[test]
    fn test_empty_window_yields_zero_metrics() {
        let candles = series(&[40000.0, 45000.0]);
        let mut engine =
            GridEngine::configure(GridConfig::new("BTCUSDT", 40000.0, 50000.0, 5, 100.0)).unwrap();

        let result = runner(1000.0).run(&candles, t(100), t(200), &mut engine);

        assert_eq!(result.metrics, PerformanceMetrics::default());
        assert!(result.equity_curve.is_empty());
        assert!(result.orders.is_empty());
    }

    #[test]
    fn test_candles_outside_window_are_skipped() {
        let candles = series(&[40000.0, 41000.0, 42000.0, 43000.0]);
        let mut engine = DcaEngine::configure(DcaConfig::new(
            "BTCUSDT",
            100.0,
            Duration::hours(1),
            10,
        ))
        .unwrap();

        let result = runner(1000.0).run(&candles, t(1), t(2), &mut engine);

        assert_eq!(result.equity_curve.len(), 2);
        assert_eq!(result.orders.len(), 2);
        assert_eq!(result.orders[0].price, 41000.0);
        assert_eq!(result.period, Duration::hours(1));
    }

    #[test]
    fn test_equity_is_cash_plus_marked_position() {
        let candles = series(&[40000.0, 50000.0]);
        let mut engine = DcaEngine::configure(DcaConfig::new(
            "BTCUSDT",
            100.0,
            Duration::hours(24),
            10,
        ))
        .unwrap();

        let result = runner(1000.0).run(&candles, t(0), t(1), &mut engine);

        assert_relative_eq!(result.equity_curve[0].equity, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(result.equity_curve[1].equity, 900.0 + 100.0 / 40000.0 * 50000.0, epsilon = 1e-9);
        assert_relative_eq!(result.metrics.total_return_pct, 2.5, epsilon = 1e-9);
        assert_eq!(result.metrics.trade_count, 1);
        assert_relative_eq!(result.metrics.win_rate, 100.0, epsilon = 1e-9);
        assert_eq!(result.realized_pnl, 0.0);
        assert_relative_eq!(result.unrealized_pnl, 100.0 / 40000.0 * 10000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_grid_run_counts_buys_and_sells() {
        let candles = series(&[40000.0, 45000.0, 50000.0]);
        let mut engine =
            GridEngine::configure(GridConfig::new("BTCUSDT", 40000.0, 50000.0, 5, 100.0)).unwrap();

        let result = runner(100.0).run(&candles, t(0), t(2), &mut engine);

        //buy 0, sell 0 + buy 2, sell 2 + buy 4
        assert_eq!(result.metrics.trade_count, 5);
        assert_eq!(result.tally.win_count, 2);
        assert_relative_eq!(result.metrics.win_rate, 40.0, epsilon = 1e-9);
        assert!(result.realized_pnl > 0.0);
        assert_relative_eq!(
            result.final_equity().unwrap(),
            100.0 + result.realized_pnl + result.unrealized_pnl,
            epsilon = 1e-9
        );
    }
}
