pub mod run_config;
pub mod strategy_config;

pub use run_config::{ComparisonPair, LiveSettings, RunConfiguration};
pub use strategy_config::{
    format_interval, parse_interval, AdaptiveSpacing, ComboConfig, ConfigError, DcaConfig,
    GridConfig, GridReinvestment, GridSpacing, StrategyConfig, MAX_GRID_LEVELS,
};
