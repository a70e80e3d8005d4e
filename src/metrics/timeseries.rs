use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//portfolio valuation (cash + mark-to-market holdings) at one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

impl EquitySample {
    pub fn new(timestamp: DateTime<Utc>, equity: f64) -> Self {
        EquitySample { timestamp, equity }
    }
}

//a point in the equity curve with its running drawdown and step return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub drawdown: f64,
    pub returns: f64,
}

impl EquityPoint {
    pub fn new(timestamp: DateTime<Utc>, equity: f64, drawdown: f64, returns: f64) -> Self {
        EquityPoint {
            timestamp,
            equity,
            drawdown,
            returns,
        }
    }
}

//annotates an equity curve with drawdowns and step returns
pub fn calculate_equity_curve(samples: &[EquitySample]) -> Vec<EquityPoint> {
    let mut curve = Vec::with_capacity(samples.len());
    let mut peak = f64::MIN;
    let mut prev_equity = 0.0;

    for (i, sample) in samples.iter().enumerate() {
        //update peak
        if sample.equity > peak {
            peak = sample.equity;
        }

        //calculate drawdown
        let drawdown = if peak > 0.0 {
            (peak - sample.equity) / peak
        } else {
            0.0
        };

        //calculate returns
        let returns = if i == 0 || prev_equity == 0.0 {
            0.0
        } else {
            sample.equity / prev_equity - 1.0
        };

        curve.push(EquityPoint::new(sample.timestamp, sample.equity, drawdown, returns));
        prev_equity = sample.equity;
    }

    curve
}

//largest peak-to-trough decline as a fraction of the running peak
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = match equity.first() {
        Some(&first) => first,
        None => return 0.0,
    };

    let mut max_dd = 0.0;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

//step returns; steps from a zero valuation are skipped
pub fn calculate_returns(equity: &[f64]) -> Vec<f64> {
    if equity.len() < 2 {
        return vec![];
    }

    equity
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect()
}
