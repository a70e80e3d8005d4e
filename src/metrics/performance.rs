use crate::metrics::timeseries::{calculate_returns, max_drawdown, EquitySample};
use chrono::Duration;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

const SECONDS_PER_YEAR: f64 = 24.0 * 3600.0 * 365.0;

//standard metric set, recomputed wholesale from an equity curve
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub max_drawdown_pct: f64,
    //per-step mean/stddev of returns: no risk-free rate, no annualization
    pub sharpe_ratio: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub total_fees: f64,
    pub volatility_impact: f64,
}

//computes the metric set from equity valuations alone
//degenerate inputs (empty curve, zero variance, zero-length period) yield zeros
pub fn compute(
    equity: &[f64],
    period: Duration,
    trade_count: usize,
    win_count: usize,
    total_fees: f64,
) -> PerformanceMetrics {
    let (first, last) = match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return PerformanceMetrics::default(),
    };

    let growth = if first != 0.0 { last / first } else { 1.0 };
    let total_return_pct = (growth - 1.0) * 100.0;

    let years = period.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_YEAR;
    let annualized_return_pct = if years > 0.0 && growth > 0.0 {
        (growth.powf(1.0 / years) - 1.0) * 100.0
    } else if years > 0.0 {
        -100.0
    } else {
        0.0
    };

    let max_drawdown_pct = (max_drawdown(equity) * 100.0).clamp(0.0, 100.0);

    let returns = calculate_returns(equity);
    let std_dev = population_std_dev(&returns);

    let sharpe_ratio = if returns.len() < 2 || std_dev == 0.0 {
        0.0
    } else {
        returns.as_slice().mean() / std_dev
    };

    let win_rate = if trade_count > 0 {
        (win_count as f64 / trade_count as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    PerformanceMetrics {
        total_return_pct,
        annualized_return_pct,
        max_drawdown_pct,
        sharpe_ratio,
        trade_count,
        win_rate,
        total_fees,
        volatility_impact: std_dev * 100.0,
    }
}

fn population_std_dev(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.population_std_dev();
    if std_dev.is_finite() {
        std_dev
    } else {
        0.0
    }
}

impl PerformanceMetrics {
    //computes metrics from timestamped equity samples
    pub fn from_curve(
        curve: &[EquitySample],
        period: Duration,
        trade_count: usize,
        win_count: usize,
        total_fees: f64,
    ) -> Self {
        let equity: Vec<f64> = curve.iter().map(|s| s.equity).collect();
        compute(&equity, period, trade_count, win_count, total_fees)
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Total Return", format!("{:.2}%", self.total_return_pct)),
            ("Annualized Return", format!("{:.2}%", self.annualized_return_pct)),
            ("Max Drawdown", format!("{:.2}%", self.max_drawdown_pct)),
            ("Sharpe Ratio (per step)", format!("{:.3}", self.sharpe_ratio)),
            ("Number of Trades", format!("{}", self.trade_count)),
            ("Win Rate", format!("{:.2}%", self.win_rate)),
            ("Total Fees", format!("${:.2}", self.total_fees)),
            ("Volatility Impact", format!("{:.3}%", self.volatility_impact)),
        ]
    }

    //prints metrics in a formatted table
    pub fn pretty_print_table(&self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![Cell::new("Metric"), Cell::new("Value")]));

        for (name, value) in self.rows() {
            table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
        }

        table.printstd();
    }

    //prints two metric sets side by side
    pub fn pretty_print_pair(left_name: &str, left: &Self, right_name: &str, right: &Self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("Metric"),
            Cell::new(left_name),
            Cell::new(right_name),
        ]));

        for ((name, left_value), (_, right_value)) in left.rows().into_iter().zip(right.rows()) {
            table.add_row(Row::new(vec![
                Cell::new(name),
                Cell::new(&left_value),
                Cell::new(&right_value),
            ]));
        }

        table.printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_curve_is_all_zero() {
        let metrics = compute(&[], Duration::days(30), 0, 0, 0.0);
        assert_eq!(metrics, PerformanceMetrics::default());
    }

    #[test]
    fn test_drawdown_scenario() {
        let metrics = compute(&[10000.0, 9000.0, 11000.0], Duration::days(365), 0, 0, 0.0);

        assert_relative_eq!(metrics.max_drawdown_pct, 10.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.total_return_pct, 10.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.annualized_return_pct, 10.0, epsilon = 1e-9);
    }

    //the ratio is a raw per-step mean/stddev, not an annualized textbook sharpe
    #[test]
    fn test_sharpe_is_per_step_mean_over_population_stddev() {
        let equity = [100.0, 110.0, 99.0, 108.9];
        let returns = [0.1, -0.1, 0.1];
        let mean: f64 = returns.iter().sum::<f64>() / 3.0;
        let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0;

        let metrics = compute(&equity, Duration::days(3), 0, 0, 0.0);
        assert_relative_eq!(metrics.sharpe_ratio, mean / variance.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(metrics.volatility_impact, variance.sqrt() * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_variance_and_zero_period() {
        let metrics = compute(&[100.0, 100.0, 100.0], Duration::zero(), 4, 2, 1.5);

        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.volatility_impact, 0.0);
        assert_eq!(metrics.annualized_return_pct, 0.0);
        assert_eq!(metrics.win_rate, 50.0);
        assert_eq!(metrics.trade_count, 4);
        assert_eq!(metrics.total_fees, 1.5);
    }

    #[test]
    fn test_single_sample() {
        let metrics = compute(&[500.0], Duration::days(1), 0, 0, 0.0);
        assert_eq!(metrics.total_return_pct, 0.0);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let equity = [1000.0, 1012.5, 990.0, 1040.0, 1001.0];
        let a = compute(&equity, Duration::days(90), 7, 3, 2.25);
        let b = compute(&equity, Duration::days(90), 7, 3, 2.25);
        assert_eq!(a, b);
        assert!(a.max_drawdown_pct >= 0.0 && a.max_drawdown_pct <= 100.0);
        assert!(a.win_rate >= 0.0 && a.win_rate <= 100.0);
    }
}
