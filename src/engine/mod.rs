pub mod backtest;
pub mod comparator;
pub mod execution;
pub mod live;

pub use backtest::{BacktestConfig, BacktestResult, BacktestRunner};
pub use comparator::{classify, compare, Comparator, MarketCondition, Period, StrategyComparison};
pub use execution::{OrderSide, SimulatedOrder, Venue, VenueError};
pub use live::{
    BotHandle, Clock, FeedError, LiveBot, LiveError, LiveReport, LiveStatus, ManualClock,
    PriceFeed, ReplayFeed, SystemClock,
};
