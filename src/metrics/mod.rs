pub mod fee_impact;
pub mod performance;
pub mod timeseries;

pub use fee_impact::FeeImpact;
pub use performance::{compute, PerformanceMetrics};
pub use timeseries::{calculate_equity_curve, calculate_returns, max_drawdown, EquityPoint, EquitySample};
