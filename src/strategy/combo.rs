use crate::config::{ComboConfig, ConfigError};
use crate::data::Candle;
use crate::engine::execution::Venue;
use crate::strategy::{pct_change, return_volatility, DcaEngine, GridEngine, StepReport, StrategyEngine, TradeTally};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::info;

//which sub-engines a combo step drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComboMode {
    Dca,
    Grid,
    Hybrid,
}

impl fmt::Display for ComboMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComboMode::Dca => write!(f, "dca"),
            ComboMode::Grid => write!(f, "grid"),
            ComboMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

//dca and grid on one symbol, switched by the regime of a rolling close window
#[derive(Debug, Clone)]
pub struct ComboEngine {
    config: ComboConfig,
    dca: DcaEngine,
    grid: GridEngine,
    closes: VecDeque<f64>,
    mode: ComboMode,
    switches: usize,
}

impl ComboEngine {
    pub fn configure(config: ComboConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let dca = DcaEngine::configure(config.dca.clone())?;
        let grid = GridEngine::configure(config.grid.clone())?;

        info!(
            symbol = %config.grid.symbol,
            lookback = config.lookback,
            "combo engine configured"
        );

        Ok(ComboEngine {
            closes: VecDeque::with_capacity(config.lookback),
            config,
            dca,
            grid,
            mode: ComboMode::Hybrid,
            switches: 0,
        })
    }

    pub fn mode(&self) -> ComboMode {
        self.mode
    }

    pub fn mode_switches(&self) -> usize {
        self.switches
    }

    pub fn dca(&self) -> &DcaEngine {
        &self.dca
    }

    pub fn grid(&self) -> &GridEngine {
        &self.grid
    }

    //regime of a close window; hybrid until the window is full
    pub fn select_mode(&self, closes: &[f64]) -> ComboMode {
        if closes.len() < self.config.lookback {
            return ComboMode::Hybrid;
        }

        let volatility = return_volatility(closes);
        let trend = pct_change(closes).unwrap_or(0.0);
        let sideways = trend.abs() <= self.config.trend_threshold;

        if volatility > self.config.high_volatility_threshold && sideways {
            ComboMode::Grid
        } else if trend < -self.config.trend_threshold {
            ComboMode::Dca
        } else {
            ComboMode::Hybrid
        }
    }

    fn observe(&mut self, close: f64) {
        self.closes.push_back(close);
        while self.closes.len() > self.config.lookback {
            self.closes.pop_front();
        }

        let window: Vec<f64> = self.closes.iter().copied().collect();
        let mode = self.select_mode(&window);
        if mode != self.mode {
            info!(
                symbol = %self.config.grid.symbol,
                from = %self.mode,
                to = %mode,
                "combo mode switch"
            );
            self.mode = mode;
            self.switches += 1;
        }
    }
}

impl StrategyEngine for ComboEngine {
    fn name(&self) -> &str {
        "Combo"
    }

    fn symbol(&self) -> &str {
        &self.config.grid.symbol
    }

    fn on_candle(&mut self, candle: &Candle, fee_rate: f64, venue: &mut dyn Venue) -> StepReport {
        self.observe(candle.close);

        let mut report = StepReport::default();
        if matches!(self.mode, ComboMode::Grid | ComboMode::Hybrid) {
            report.merge(self.grid.on_candle(candle, fee_rate, venue));
        }
        if matches!(self.mode, ComboMode::Dca | ComboMode::Hybrid) {
            report.merge(self.dca.on_candle(candle, fee_rate, venue));
        }
        report
    }

    fn position_quantity(&self) -> f64 {
        self.grid.position_quantity() + self.dca.position_quantity()
    }

    fn tally(&self, mark_price: f64) -> TradeTally {
        self.grid.tally(mark_price).combine(self.dca.tally(mark_price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DcaConfig, GridConfig};
    use crate::portfolio::Ledger;
    use chrono::{Duration, TimeZone, Utc};

    fn engine(lookback: usize) -> ComboEngine {
        let mut config = ComboConfig::new(
            DcaConfig::new("BTCUSDT", 100.0, Duration::hours(1), 100),
            GridConfig::new("BTCUSDT", 80.0, 120.0, 5, 100.0),
        );
        config.lookback = lookback;
        ComboEngine::configure(config).unwrap()
    }

    #[test]
    fn test_short_window_is_hybrid() {
        let combo = engine(4);
        assert_eq!(combo.select_mode(&[100.0, 90.0]), ComboMode::Hybrid);
    }

    #[test]
    fn test_choppy_sideways_market_selects_grid() {
        let combo = engine(4);
        assert_eq!(
            combo.select_mode(&[100.0, 110.0, 95.0, 101.0]),
            ComboMode::Grid
        );
    }

    #[test]
    fn test_falling_market_selects_dca() {
        let combo = engine(4);
        assert_eq!(combo.select_mode(&[100.0, 98.0, 96.0, 90.0]), ComboMode::Dca);
    }

    #[test]
    fn test_calm_market_stays_hybrid() {
        let combo = engine(4);
        assert_eq!(
            combo.select_mode(&[100.0, 100.5, 100.0, 100.5]),
            ComboMode::Hybrid
        );
    }

    #[test]
    fn test_rolling_window_drops_old_closes() {
        let mut combo = engine(3);
        let mut ledger = Ledger::new(100_000.0);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        //falls into dca, then the window forgets the drop and sees a calm market
        for (i, close) in [110.0, 100.0, 90.0, 90.0, 90.5, 90.0].iter().enumerate() {
            let candle = Candle::from_price(start + Duration::hours(i as i64), *close);
            combo.on_candle(&candle, 0.0, &mut ledger);
            if i == 2 {
                assert_eq!(combo.mode(), ComboMode::Dca);
            }
        }

        assert_eq!(combo.mode(), ComboMode::Hybrid);
        assert_eq!(combo.mode_switches(), 2);
    }

    #[test]
    fn test_mismatched_symbols_are_rejected() {
        let config = ComboConfig::new(
            DcaConfig::new("ETHUSDT", 100.0, Duration::hours(1), 10),
            GridConfig::new("BTCUSDT", 80.0, 120.0, 5, 100.0),
        );
        assert!(matches!(
            ComboEngine::configure(config),
            Err(ConfigError::InvalidCombo(_))
        ));
    }

    #[test]
    fn test_falling_series_switches_to_dca_only() {
        let mut combo = engine(3);
        let mut ledger = Ledger::new(100_000.0);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for (i, close) in [110.0, 100.0, 90.0, 85.0].iter().enumerate() {
            let candle = Candle::from_price(start + Duration::hours(i as i64), *close);
            combo.on_candle(&candle, 0.0, &mut ledger);
        }

        assert_eq!(combo.mode(), ComboMode::Dca);
        assert_eq!(combo.mode_switches(), 1);
        //hybrid phase bought on the grid, the dca leg kept buying every hour
        assert!(combo.grid().stats().buy_count > 0);
        assert_eq!(combo.dca().state().buy_count, 4);
        assert_eq!(combo.tally(85.0).trade_count, combo.grid().stats().buy_count + 4);
    }
}
