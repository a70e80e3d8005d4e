use crate::metrics::performance::PerformanceMetrics;
use chrono::Duration;
use serde::{Deserialize, Serialize};

const DAYS_PER_MONTH: f64 = 30.0;

//margin a trade needs over its fee to be worth placing
const MIN_PROFIT_FEE_MULTIPLE: f64 = 2.5;

//how much of a strategy's return its trading fees consume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeImpact {
    pub strategy: String,
    pub trades_per_month: f64,
    //average fee paid per trade
    pub average_fee: f64,
    pub monthly_fee_cost: f64,
    //monthly fee cost as a percentage of monthly return
    pub fee_to_return_ratio: f64,
    pub optimal_min_profit: f64,
}

impl FeeImpact {
    pub fn analyze(
        strategy: &str,
        trades_per_month: f64,
        average_fee: f64,
        monthly_return: f64,
    ) -> Self {
        let monthly_fee_cost = trades_per_month * average_fee;
        let fee_to_return_ratio = if monthly_return != 0.0 {
            monthly_fee_cost / monthly_return * 100.0
        } else {
            0.0
        };

        FeeImpact {
            strategy: strategy.to_string(),
            trades_per_month,
            average_fee,
            monthly_fee_cost,
            fee_to_return_ratio,
            optimal_min_profit: average_fee * MIN_PROFIT_FEE_MULTIPLE,
        }
    }

    //derives the monthly figures from a backtest's metrics
    pub fn from_metrics(
        strategy: &str,
        metrics: &PerformanceMetrics,
        period: Duration,
        initial_capital: f64,
    ) -> Self {
        let months = period.num_seconds() as f64 / 86_400.0 / DAYS_PER_MONTH;
        if months <= 0.0 {
            return FeeImpact::analyze(strategy, 0.0, 0.0, 0.0);
        }

        let average_fee = if metrics.trade_count > 0 {
            metrics.total_fees / metrics.trade_count as f64
        } else {
            0.0
        };
        let monthly_return = initial_capital * metrics.total_return_pct / 100.0 / months;

        FeeImpact::analyze(
            strategy,
            metrics.trade_count as f64 / months,
            average_fee,
            monthly_return,
        )
    }
}
