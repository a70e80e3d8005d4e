use crate::strategy::{ComboEngine, DcaEngine, GridEngine, StrategyEngine};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//validation failures, surfaced once when an engine is configured
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("symbol is required")]
    EmptySymbol,
    #[error("upper bound ({upper}) must be greater than lower bound ({lower})")]
    InvalidBounds { lower: f64, upper: f64 },
    #[error("grid needs at least 2 levels, got {0}")]
    TooFewLevels(usize),
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("interval must be positive")]
    NonPositiveInterval,
    #[error("max investments must be positive")]
    ZeroMaxInvestments,
    #[error("geometric spacing needs a positive lower bound, got {0}")]
    GeometricLowerBound(f64),
    #[error("invalid adaptive spacing: {0}")]
    InvalidAdaptiveSpacing(String),
    #[error("invalid combo config: {0}")]
    InvalidCombo(String),
    #[error("invalid reinvestment: {0}")]
    InvalidReinvestment(String),
    #[error("grid allows at most {max} levels, config implies {requested}")]
    TooManyLevels { requested: f64, max: usize },
}

//upper bound on grid levels, fixed or adaptive
pub const MAX_GRID_LEVELS: usize = 1000;

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if positive(value) {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn enabled_by_default() -> bool {
    true
}

//volatility driven spacing, recomputed from the atr on every candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSpacing {
    pub factor: f64,
    pub min_spacing: f64,
    pub max_spacing: f64,
    #[serde(default = "AdaptiveSpacing::default_atr_period")]
    pub atr_period: usize,
}

impl AdaptiveSpacing {
    fn default_atr_period() -> usize {
        14
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.factor) {
            return Err(ConfigError::InvalidAdaptiveSpacing(format!(
                "factor must be positive, got {}",
                self.factor
            )));
        }
        if !positive(self.min_spacing) || !positive(self.max_spacing) {
            return Err(ConfigError::InvalidAdaptiveSpacing(
                "spacing limits must be positive".to_string(),
            ));
        }
        if self.min_spacing > self.max_spacing {
            return Err(ConfigError::InvalidAdaptiveSpacing(format!(
                "min spacing {} exceeds max spacing {}",
                self.min_spacing, self.max_spacing
            )));
        }
        if self.atr_period == 0 {
            return Err(ConfigError::InvalidAdaptiveSpacing(
                "atr period must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

//share of each profitable sell added back to the order size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridReinvestment {
    pub rate: f64,
    //sells below this profit leave the order size alone
    #[serde(default)]
    pub profit_threshold: f64,
}

impl GridReinvestment {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.rate) || self.rate > 1.0 {
            return Err(ConfigError::InvalidReinvestment(format!(
                "rate must be in (0, 1], got {}",
                self.rate
            )));
        }
        if !self.profit_threshold.is_finite() || self.profit_threshold < 0.0 {
            return Err(ConfigError::InvalidReinvestment(format!(
                "profit threshold must not be negative, got {}",
                self.profit_threshold
            )));
        }
        Ok(())
    }
}

//how grid levels are laid out between the bounds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GridSpacing {
    #[default]
    Arithmetic,
    Geometric,
    Adaptive(AdaptiveSpacing),
}

//grid strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub symbol: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub level_count: usize,
    pub investment_per_level: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub spacing: GridSpacing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinvestment: Option<GridReinvestment>,
}

impl GridConfig {
    pub fn new(
        symbol: impl Into<String>,
        lower_bound: f64,
        upper_bound: f64,
        level_count: usize,
        investment_per_level: f64,
    ) -> Self {
        GridConfig {
            symbol: symbol.into(),
            lower_bound,
            upper_bound,
            level_count,
            investment_per_level,
            enabled: true,
            spacing: GridSpacing::Arithmetic,
            reinvestment: None,
        }
    }

    pub fn with_spacing(mut self, spacing: GridSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_reinvestment(mut self, reinvestment: GridReinvestment) -> Self {
        self.reinvestment = Some(reinvestment);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }

        if !self.lower_bound.is_finite()
            || !self.upper_bound.is_finite()
            || self.upper_bound <= self.lower_bound
        {
            return Err(ConfigError::InvalidBounds {
                lower: self.lower_bound,
                upper: self.upper_bound,
            });
        }

        if self.level_count < 2 {
            return Err(ConfigError::TooFewLevels(self.level_count));
        }
        if self.level_count > MAX_GRID_LEVELS {
            return Err(ConfigError::TooManyLevels {
                requested: self.level_count as f64,
                max: MAX_GRID_LEVELS,
            });
        }

        require_positive("investment per level", self.investment_per_level)?;

        if let Some(reinvestment) = &self.reinvestment {
            reinvestment.validate()?;
        }

        match &self.spacing {
            GridSpacing::Arithmetic => Ok(()),
            GridSpacing::Geometric if self.lower_bound <= 0.0 => {
                Err(ConfigError::GeometricLowerBound(self.lower_bound))
            }
            GridSpacing::Geometric => Ok(()),
            GridSpacing::Adaptive(adaptive) => {
                adaptive.validate()?;
                //the narrowest spacing decides how many levels a rebuild may lay out
                let densest = (self.upper_bound - self.lower_bound) / adaptive.min_spacing;
                if densest > MAX_GRID_LEVELS as f64 {
                    return Err(ConfigError::TooManyLevels {
                        requested: densest.floor(),
                        max: MAX_GRID_LEVELS,
                    });
                }
                Ok(())
            }
        }
    }
}

//dollar-cost averaging parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaConfig {
    pub symbol: String,
    pub investment_amount: f64,
    #[serde(with = "interval_format")]
    pub interval: Duration,
    pub max_investments: u32,
    //0 disables the ceiling
    #[serde(default)]
    pub price_threshold: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl DcaConfig {
    pub fn new(
        symbol: impl Into<String>,
        investment_amount: f64,
        interval: Duration,
        max_investments: u32,
    ) -> Self {
        DcaConfig {
            symbol: symbol.into(),
            investment_amount,
            interval,
            max_investments,
            price_threshold: 0.0,
            enabled: true,
        }
    }

    pub fn with_price_threshold(mut self, threshold: f64) -> Self {
        self.price_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }

        require_positive("investment amount", self.investment_amount)?;

        if self.interval <= Duration::zero() {
            return Err(ConfigError::NonPositiveInterval);
        }

        if self.max_investments == 0 {
            return Err(ConfigError::ZeroMaxInvestments);
        }

        Ok(())
    }
}

//dca and grid composed, switched by the recent market regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboConfig {
    pub dca: DcaConfig,
    pub grid: GridConfig,
    #[serde(default = "ComboConfig::default_lookback")]
    pub lookback: usize,
    #[serde(default = "ComboConfig::default_high_volatility_threshold")]
    pub high_volatility_threshold: f64,
    #[serde(default = "ComboConfig::default_trend_threshold")]
    pub trend_threshold: f64,
}

impl ComboConfig {
    fn default_lookback() -> usize {
        20
    }

    fn default_high_volatility_threshold() -> f64 {
        0.02
    }

    fn default_trend_threshold() -> f64 {
        0.05
    }

    pub fn new(dca: DcaConfig, grid: GridConfig) -> Self {
        ComboConfig {
            dca,
            grid,
            lookback: Self::default_lookback(),
            high_volatility_threshold: Self::default_high_volatility_threshold(),
            trend_threshold: Self::default_trend_threshold(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dca.validate()?;
        self.grid.validate()?;

        if self.dca.symbol != self.grid.symbol {
            return Err(ConfigError::InvalidCombo(format!(
                "dca symbol {} differs from grid symbol {}",
                self.dca.symbol, self.grid.symbol
            )));
        }
        if self.lookback < 2 {
            return Err(ConfigError::InvalidCombo(
                "lookback must cover at least 2 candles".to_string(),
            ));
        }
        if !positive(self.high_volatility_threshold) || !positive(self.trend_threshold) {
            return Err(ConfigError::InvalidCombo(
                "thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

//strategy selection, validated once when the engine is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Dca(DcaConfig),
    Grid(GridConfig),
    Combo(ComboConfig),
}

impl StrategyConfig {
    pub fn symbol(&self) -> &str {
        match self {
            StrategyConfig::Dca(config) => &config.symbol,
            StrategyConfig::Grid(config) => &config.symbol,
            StrategyConfig::Combo(config) => &config.grid.symbol,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::Dca(config) => config.validate(),
            StrategyConfig::Grid(config) => config.validate(),
            StrategyConfig::Combo(config) => config.validate(),
        }
    }

    //builds the engine this config describes
    pub fn build(&self) -> Result<Box<dyn StrategyEngine>, ConfigError> {
        Ok(match self {
            StrategyConfig::Dca(config) => Box::new(DcaEngine::configure(config.clone())?),
            StrategyConfig::Grid(config) => Box::new(GridEngine::configure(config.clone())?),
            StrategyConfig::Combo(config) => Box::new(ComboEngine::configure(config.clone())?),
        })
    }
}

//parses "30s", "15m", "24h", "7d" or bare seconds
//none for unknown units and for spans chrono cannot represent
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: i64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        _ => None,
    }
}

//formats an interval in the largest whole unit
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.num_seconds();
    if secs != 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs != 0 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

mod interval_format {
    use super::{format_interval, parse_interval};
    use chrono::Duration;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_interval(*interval))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Duration::try_seconds(secs)
                .ok_or_else(|| de::Error::custom(format!("interval out of range: {}s", secs))),
            Raw::Text(text) => parse_interval(&text)
                .ok_or_else(|| de::Error::custom(format!("invalid interval format: {}", text))),
        }
    }
}
