use crate::config::strategy_config::{DcaConfig, GridConfig, StrategyConfig};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

//the dca/grid pair a comparison runs side by side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonPair {
    pub dca: DcaConfig,
    pub grid: GridConfig,
}

//live loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSettings {
    //seconds between two engine steps
    pub cadence_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings { cadence_secs: 30 }
    }
}

//complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    //data
    pub data_path: PathBuf,
    pub symbol: String,

    //evaluation window, defaults to the full archive
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,

    //account settings
    pub initial_capital: f64,
    pub fee_rate: f64,

    //strategy under test
    pub strategy: StrategyConfig,

    //optional comparison pair
    #[serde(default)]
    pub comparison: Option<ComparisonPair>,

    #[serde(default)]
    pub live: LiveSettings,

    //optional output path
    #[serde(default)]
    pub output_equity_csv: Option<PathBuf>,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        let dca = DcaConfig::new("BTCUSDT", 100.0, Duration::hours(24), 100);
        let grid = GridConfig::new("BTCUSDT", 30000.0, 60000.0, 20, 100.0);

        RunConfiguration {
            data_path: PathBuf::from("data.csv"),
            symbol: "BTCUSDT".to_string(),
            start: None,
            end: None,
            initial_capital: 10000.0,
            fee_rate: 0.001,
            strategy: StrategyConfig::Grid(grid.clone()),
            comparison: Some(ComparisonPair { dca, grid }),
            live: LiveSettings::default(),
            output_equity_csv: None,
        }
    }
}

impl RunConfiguration {
    //load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file {:?}", path))?;
        let config: RunConfiguration = serde_json::from_str(&contents)
            .context(format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    //save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    //checks account settings and every strategy config
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            anyhow::bail!("initial capital must be positive, got {}", self.initial_capital);
        }
        if !(self.fee_rate.is_finite() && (0.0..1.0).contains(&self.fee_rate)) {
            anyhow::bail!("fee rate must be in [0, 1), got {}", self.fee_rate);
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                anyhow::bail!("window end {} is before start {}", end, start);
            }
        }

        if self.live.cadence_secs == 0 {
            anyhow::bail!("live cadence must be at least one second");
        }

        self.strategy.validate().context("invalid strategy config")?;

        if let Some(pair) = &self.comparison {
            pair.dca.validate().context("invalid comparison dca config")?;
            pair.grid.validate().context("invalid comparison grid config")?;
        }

        Ok(())
    }

    //resolves the evaluation window against the loaded archive bounds
    pub fn window(
        &self,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start.unwrap_or(first), self.end.unwrap_or(last))
    }
}
