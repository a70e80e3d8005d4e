use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CandleError {
    #[error("Invalid OHLC values: high ({high}) < low ({low})")]
    InvalidHighLow { high: f64, low: f64 },
    #[error("Invalid OHLC values: close ({close}) outside high-low range [{low}, {high}]")]
    InvalidClose { close: f64, high: f64, low: f64 },
    #[error("Invalid OHLC values: open ({open}) outside high-low range [{low}, {high}]")]
    InvalidOpen { open: f64, high: f64, low: f64 },
    #[error("Negative volume: {0}")]
    NegativeVolume(f64),
}

//a single ohlcv candle of a symbol's price history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    //creates a new candle with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleError> {
        if high < low {
            return Err(CandleError::InvalidHighLow { high, low });
        }

        if close < low || close > high {
            return Err(CandleError::InvalidClose { close, high, low });
        }

        if open < low || open > high {
            return Err(CandleError::InvalidOpen { open, high, low });
        }

        if volume < 0.0 {
            return Err(CandleError::NegativeVolume(volume));
        }

        Ok(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    //creates a candle without validation
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    //a flat candle for a single traded price (live ticks have no range)
    pub fn from_price(timestamp: DateTime<Utc>, price: f64) -> Self {
        Candle::new_unchecked(timestamp, price, price, price, price, 0.0)
    }

    //returns the range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    //true range against the previous close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        self.range()
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }

    //returns true if the candle falls inside the inclusive window
    pub fn within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.timestamp >= start && self.timestamp <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_inverted_high_low() {
        let err = Candle::new(ts(), 10.0, 9.0, 11.0, 10.0, 1.0).unwrap_err();
        assert_eq!(err, CandleError::InvalidHighLow { high: 9.0, low: 11.0 });
    }

    #[test]
    fn test_true_range_uses_gap_to_previous_close() {
        let candle = Candle::new(ts(), 105.0, 110.0, 104.0, 108.0, 1.0).unwrap();
        assert_eq!(candle.true_range(100.0), 10.0);
        assert_eq!(candle.true_range(107.0), 6.0);
    }

    #[test]
    fn test_window_is_inclusive() {
        let candle = Candle::from_price(ts(), 1.0);
        assert!(candle.within(ts(), ts()));
        assert!(!candle.within(ts() + chrono::Duration::seconds(1), ts() + chrono::Duration::days(1)));
    }
}
