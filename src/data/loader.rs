use crate::data::candle::Candle;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

//loads candles from a csv file with a timestamp,open,high,low,close,volume header
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let file =
        std::fs::File::open(path).context(format!("Failed to open CSV file: {:?}", path))?;

    let candles = read_candles(file)?;
    if candles.is_empty() {
        anyhow::bail!("No candles loaded from {:?}", path);
    }

    info!(path = %path.display(), count = candles.len(), "loaded candles");
    Ok(candles)
}

//reads candles from any csv source
//unreadable, short, malformed or inconsistent rows are skipped, not reported
pub fn read_candles<R: Read>(source: R) -> Result<Vec<Candle>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    reader.headers().context("Failed to read CSV header")?;

    let mut candles = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                debug!(line = index + 2, %err, "skipping unreadable candle row");
                continue;
            }
        };

        match parse_record(&record) {
            Some(candle) => candles.push(candle),
            None => debug!(line = index + 2, "skipping malformed candle row"),
        }
    }

    //sort by timestamp to ensure chronological order
    candles.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(candles)
}

fn parse_record(record: &StringRecord) -> Option<Candle> {
    if record.len() < 6 {
        return None;
    }

    let timestamp = parse_timestamp(record.get(0)?.trim())?;
    let mut values = [0.0; 5];
    for (slot, field) in values.iter_mut().zip(record.iter().skip(1)) {
        *slot = field.trim().parse::<f64>().ok()?;
    }

    let [open, high, low, close, volume] = values;
    match Candle::new(timestamp, open, high, low, close, volume) {
        Ok(candle) => Some(candle),
        Err(err) => {
            debug!(%err, "rejecting candle row");
            None
        }
    }
}

//parses rfc3339 and the common naive utc layouts exchanges export
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

//returns the candles inside the inclusive window
pub fn filter_window(candles: &[Candle], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Candle> {
    candles
        .iter()
        .filter(|candle| candle.within(start, end))
        .copied()
        .collect()
}
