pub mod candle;
pub mod loader;

pub use candle::{Candle, CandleError};
pub use loader::{filter_window, load_csv, parse_timestamp, read_candles};
