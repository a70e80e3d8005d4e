use crate::config::{ConfigError, DcaConfig, GridConfig};
use crate::data::Candle;
use crate::engine::backtest::{BacktestConfig, BacktestResult, BacktestRunner};
use crate::metrics::PerformanceMetrics;
use crate::strategy::{pct_change, DcaEngine, GridEngine};
use chrono::{DateTime, Utc};
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

//moves beyond +/-10% over the window count as a trend
const TREND_THRESHOLD: f64 = 0.10;

//coarse label of a window's price behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Bull,
    Bear,
    Sideways,
    //never produced by `classify`
    HighVolatility,
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketCondition::Bull => write!(f, "bull"),
            MarketCondition::Bear => write!(f, "bear"),
            MarketCondition::Sideways => write!(f, "sideways"),
            MarketCondition::HighVolatility => write!(f, "high_volatility"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

//side-by-side result of one comparison request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyComparison {
    pub symbol: String,
    pub grid_metrics: PerformanceMetrics,
    pub dca_metrics: PerformanceMetrics,
    pub period: Period,
    pub market_condition: MarketCondition,
}

impl StrategyComparison {
    //name of the strategy with the higher total return, grid on ties
    pub fn leader(&self) -> &'static str {
        if self.dca_metrics.total_return_pct > self.grid_metrics.total_return_pct {
            "DCA"
        } else {
            "Grid"
        }
    }

    pub fn pretty_print_table(&self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![Cell::new("Symbol"), Cell::new(&self.symbol)]));
        table.add_row(Row::new(vec![
            Cell::new("Period"),
            Cell::new(&format!(
                "{} to {} ({} days)",
                self.period.start.format("%Y-%m-%d"),
                self.period.end.format("%Y-%m-%d"),
                self.period.days()
            )),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Market"),
            Cell::new(&self.market_condition.to_string()),
        ]));
        table.printstd();

        PerformanceMetrics::pretty_print_pair("Grid", &self.grid_metrics, "DCA", &self.dca_metrics);
    }
}

//labels the window by the change from its first to its last close
pub fn classify(candles: &[Candle], start: DateTime<Utc>, end: DateTime<Utc>) -> MarketCondition {
    let closes: Vec<f64> = candles
        .iter()
        .filter(|candle| candle.within(start, end))
        .map(|candle| candle.close)
        .collect();

    match pct_change(&closes) {
        Some(change) if change > TREND_THRESHOLD => MarketCondition::Bull,
        Some(change) if change < -TREND_THRESHOLD => MarketCondition::Bear,
        _ => MarketCondition::Sideways,
    }
}

//runs both engines over the same window with the same capital
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    runner: BacktestRunner,
}

impl Comparator {
    pub fn new(config: BacktestConfig) -> Self {
        Comparator {
            runner: BacktestRunner::new(config),
        }
    }

    //full backtest results of both runs, grid first
    pub fn run_pair(
        &self,
        candles: &[Candle],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dca: DcaConfig,
        grid: GridConfig,
    ) -> Result<(BacktestResult, BacktestResult), ConfigError> {
        let mut dca_engine = DcaEngine::configure(dca)?;
        let mut grid_engine = GridEngine::configure(grid)?;

        //independent runs, each a sequential pass
        let (grid_result, dca_result) = rayon::join(
            || self.runner.run(candles, start, end, &mut grid_engine),
            || self.runner.run(candles, start, end, &mut dca_engine),
        );

        Ok((grid_result, dca_result))
    }

    pub fn compare(
        &self,
        symbol: &str,
        candles: &[Candle],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dca: DcaConfig,
        grid: GridConfig,
    ) -> Result<StrategyComparison, ConfigError> {
        let (grid_result, dca_result) = self.run_pair(candles, start, end, dca, grid)?;
        let market_condition = classify(candles, start, end);

        info!(
            symbol,
            market = %market_condition,
            grid_return = grid_result.metrics.total_return_pct,
            dca_return = dca_result.metrics.total_return_pct,
            "comparison finished"
        );

        Ok(StrategyComparison {
            symbol: symbol.to_string(),
            grid_metrics: grid_result.metrics,
            dca_metrics: dca_result.metrics,
            period: Period { start, end },
            market_condition,
        })
    }
}

//compares dca and grid on one window
#[allow(clippy::too_many_arguments)]
pub fn compare(
    symbol: &str,
    candles: &[Candle],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    initial_capital: f64,
    fee_rate: f64,
    dca: DcaConfig,
    grid: GridConfig,
) -> Result<StrategyComparison, ConfigError> {
    Comparator::new(BacktestConfig {
        initial_capital,
        fee_rate,
    })
    .compare(symbol, candles, start, end, dca, grid)
}
