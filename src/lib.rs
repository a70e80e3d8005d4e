//grid trading and dollar-cost averaging engines with backtesting, strategy comparison and a live loop

pub mod config;
pub mod data;
pub mod engine;
pub mod metrics;
pub mod portfolio;
pub mod strategy;

//prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        AdaptiveSpacing, ComboConfig, ComparisonPair, ConfigError, DcaConfig, GridConfig,
        GridReinvestment, GridSpacing, RunConfiguration, StrategyConfig,
    };
    pub use crate::data::{filter_window, load_csv, Candle};
    pub use crate::engine::{
        classify, compare, BacktestConfig, BacktestResult, BacktestRunner, BotHandle, Clock,
        Comparator, LiveBot, LiveError, ManualClock, MarketCondition, OrderSide, PriceFeed,
        ReplayFeed, SimulatedOrder, StrategyComparison, SystemClock, Venue, VenueError,
    };
    pub use crate::metrics::{
        calculate_equity_curve, compute, EquityPoint, EquitySample, FeeImpact, PerformanceMetrics,
    };
    pub use crate::portfolio::{AllowAll, GatedVenue, Ledger, MaxExposure, Position, RiskGate};
    pub use crate::strategy::{
        ComboEngine, ComboMode, DcaEngine, EngineStatus, GridEngine, StrategyEngine, TradeTally,
    };
}
