use crate::data::Candle;
use crate::engine::execution::Venue;
use crate::strategy::{EngineStatus, StrategyEngine};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

//source of the current time for engine steps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//clock moved by hand, used for replays and tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("price feed unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum LiveError {
    #[error("cadence must be positive")]
    ZeroCadence,
}

//latest price for a symbol; Ok(None) means the feed has ended
pub trait PriceFeed: Send {
    fn latest_price(&mut self, symbol: &str) -> Result<Option<f64>, FeedError>;

    //the candle the next step evaluates; a bare price becomes a flat candle at `now`
    fn latest_candle(
        &mut self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Candle>, FeedError> {
        Ok(self
            .latest_price(symbol)?
            .map(|price| Candle::from_price(now, price)))
    }
}

//replays a candle archive one candle per tick, moving a shared clock along
#[derive(Debug)]
pub struct ReplayFeed {
    candles: VecDeque<Candle>,
    clock: Arc<ManualClock>,
}

impl ReplayFeed {
    pub fn new(candles: Vec<Candle>, clock: Arc<ManualClock>) -> Self {
        ReplayFeed {
            candles: candles.into(),
            clock,
        }
    }
}

impl PriceFeed for ReplayFeed {
    fn latest_price(&mut self, symbol: &str) -> Result<Option<f64>, FeedError> {
        let now = self.clock.now();
        Ok(self.latest_candle(symbol, now)?.map(|candle| candle.close))
    }

    //archived candles keep their own range and timestamp
    fn latest_candle(
        &mut self,
        _symbol: &str,
        _now: DateTime<Utc>,
    ) -> Result<Option<Candle>, FeedError> {
        Ok(self.candles.pop_front().map(|candle| {
            self.clock.set(candle.timestamp);
            candle
        }))
    }
}

//engine state shared between the step loop and status queries
struct BotState {
    engine: Box<dyn StrategyEngine>,
    last_price: Option<f64>,
    ticks: u64,
    skipped: u64,
}

//snapshot returned to status queries
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatus {
    pub engine: EngineStatus,
    pub last_price: Option<f64>,
    pub ticks: u64,
    pub skipped: u64,
}

//read-only view on a running bot
#[derive(Clone)]
pub struct BotHandle {
    state: Arc<RwLock<BotState>>,
}

impl BotHandle {
    pub async fn status(&self) -> LiveStatus {
        let state = self.state.read().await;
        let mark = state.last_price.unwrap_or(0.0);
        LiveStatus {
            engine: state.engine.status(mark),
            last_price: state.last_price,
            ticks: state.ticks,
            skipped: state.skipped,
        }
    }
}

//what a finished run hands back
#[derive(Debug)]
pub struct LiveReport<V> {
    pub ticks: u64,
    pub skipped: u64,
    pub venue: V,
}

enum TickOutcome {
    Stepped,
    Skipped,
    Exhausted,
}

//drives one engine on a fixed cadence against a venue
pub struct LiveBot<F, V> {
    state: Arc<RwLock<BotState>>,
    feed: F,
    venue: V,
    clock: Arc<dyn Clock>,
    cadence: Duration,
    fee_rate: f64,
}

impl<F: PriceFeed, V: Venue + Send> LiveBot<F, V> {
    pub fn new(
        engine: Box<dyn StrategyEngine>,
        feed: F,
        venue: V,
        clock: Arc<dyn Clock>,
        cadence: Duration,
        fee_rate: f64,
    ) -> Result<Self, LiveError> {
        if cadence.is_zero() {
            return Err(LiveError::ZeroCadence);
        }

        Ok(LiveBot {
            state: Arc::new(RwLock::new(BotState {
                engine,
                last_price: None,
                ticks: 0,
                skipped: 0,
            })),
            feed,
            venue,
            clock,
            cadence,
            fee_rate,
        })
    }

    pub fn handle(&self) -> BotHandle {
        BotHandle {
            state: Arc::clone(&self.state),
        }
    }

    //steps the engine until the feed ends or shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LiveReport<V> {
        let mut ticker = interval(self.cadence);

        {
            let state = self.state.read().await;
            info!(
                strategy = state.engine.name(),
                symbol = state.engine.symbol(),
                cadence_ms = self.cadence.as_millis() as u64,
                "live bot started"
            );
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let TickOutcome::Exhausted = self.tick().await {
                        info!("price feed ended");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        }

        let state = self.state.read().await;
        info!(ticks = state.ticks, skipped = state.skipped, "live bot stopped");
        LiveReport {
            ticks: state.ticks,
            skipped: state.skipped,
            venue: self.venue,
        }
    }

    async fn tick(&mut self) -> TickOutcome {
        let symbol = {
            let state = self.state.read().await;
            state.engine.symbol().to_string()
        };

        let candle = match self.feed.latest_candle(&symbol, self.clock.now()) {
            Ok(Some(candle)) => candle,
            Ok(None) => return TickOutcome::Exhausted,
            Err(err) => {
                warn!(%symbol, %err, "skipping tick");
                self.state.write().await.skipped += 1;
                return TickOutcome::Skipped;
            }
        };

        //held for the whole step so readers never see a half-updated engine
        let mut state = self.state.write().await;
        let report = state.engine.on_candle(&candle, self.fee_rate, &mut self.venue);
        state.last_price = Some(candle.close);
        state.ticks += 1;

        if !report.is_empty() {
            debug!(
                %symbol,
                price = candle.close,
                orders = report.orders.len(),
                realized = report.realized_pnl,
                "live step"
            );
        }
        TickOutcome::Stepped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdaptiveSpacing, DcaConfig, GridConfig, GridSpacing};
    use crate::engine::backtest::{BacktestConfig, BacktestRunner};
    use crate::portfolio::Ledger;
    use crate::strategy::{DcaEngine, GridEngine};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    //constant price that fails on the listed calls
    struct FlakyFeed {
        price: f64,
        calls: usize,
        failing: Vec<usize>,
    }

    impl PriceFeed for FlakyFeed {
        fn latest_price(&mut self, _symbol: &str) -> Result<Option<f64>, FeedError> {
            self.calls += 1;
            if self.failing.contains(&self.calls) {
                return Err(FeedError::Unavailable("timeout".to_string()));
            }
            Ok(Some(self.price))
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(t0());
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now(), t0() + chrono::Duration::hours(2));
        clock.set(t0());
        assert_eq!(clock.now(), t0());
    }

    #[tokio::test]
    async fn test_replay_runs_until_feed_ends() {
        let clock = Arc::new(ManualClock::new(t0()));
        let candles: Vec<Candle> = [45000.0, 44000.0, 43000.0]
            .iter()
            .enumerate()
            .map(|(i, &price)| Candle::from_price(t0() + chrono::Duration::days(i as i64), price))
            .collect();
        let feed = ReplayFeed::new(candles, Arc::clone(&clock));
        let engine = DcaEngine::configure(DcaConfig::new(
            "BTCUSDT",
            100.0,
            chrono::Duration::hours(24),
            10,
        ))
        .unwrap();

        let bot = LiveBot::new(
            Box::new(engine),
            feed,
            Ledger::new(1000.0),
            clock,
            Duration::from_millis(1),
            0.0,
        )
        .unwrap();
        let handle = bot.handle();
        let (_tx, rx) = watch::channel(false);

        let report = bot.run(rx).await;

        assert_eq!(report.ticks, 3);
        assert_eq!(report.venue.trade_log.len(), 3);
        let status = handle.status().await;
        assert_eq!(status.engine.tally.trade_count, 3);
        assert_eq!(status.last_price, Some(43000.0));
    }

    #[tokio::test]
    async fn test_feed_errors_skip_the_tick() {
        let clock = Arc::new(ManualClock::new(t0()));
        let feed = FlakyFeed {
            price: 45000.0,
            calls: 0,
            failing: vec![1, 2],
        };
        let engine =
            GridEngine::configure(GridConfig::new("BTCUSDT", 40000.0, 50000.0, 5, 100.0)).unwrap();
        let bot = LiveBot::new(
            Box::new(engine),
            feed,
            Ledger::new(1000.0),
            clock,
            Duration::from_millis(1),
            0.0,
        )
        .unwrap();
        let handle = bot.handle();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(bot.run(rx));
        while handle.status().await.ticks < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tx.send(true).unwrap();
        let report = task.await.unwrap();

        assert_eq!(report.skipped, 2);
        assert!(report.ticks >= 1);
        //45000, 47500 and 50000 bought once, never again
        assert_eq!(report.venue.trade_log.len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let feed = FlakyFeed {
            price: 100.0,
            calls: 0,
            failing: Vec::new(),
        };
        let engine =
            GridEngine::configure(GridConfig::new("BTCUSDT", 40000.0, 50000.0, 5, 100.0)).unwrap();
        let bot = LiveBot::new(
            Box::new(engine),
            feed,
            Ledger::new(1000.0),
            Arc::new(SystemClock),
            Duration::from_secs(3600),
            0.0,
        )
        .unwrap();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(bot.run(rx));
        tx.send(true).unwrap();
        let report = task.await.unwrap();

        //only the immediate first tick can have run
        assert!(report.ticks <= 1);
        assert!(report.venue.trade_log.is_empty());
    }

    #[test]
    fn test_zero_cadence_is_rejected() {
        let engine =
            GridEngine::configure(GridConfig::new("BTCUSDT", 40000.0, 50000.0, 5, 100.0)).unwrap();
        let feed = FlakyFeed {
            price: 45000.0,
            calls: 0,
            failing: Vec::new(),
        };

        let bot = LiveBot::new(
            Box::new(engine),
            feed,
            Ledger::new(1000.0),
            Arc::new(SystemClock),
            Duration::ZERO,
            0.0,
        );
        assert!(matches!(bot, Err(LiveError::ZeroCadence)));
    }

    #[test]
    fn test_replay_feed_keeps_the_archived_range() {
        let clock = Arc::new(ManualClock::new(t0()));
        let archived = Candle::new(t0() + chrono::Duration::hours(1), 100.0, 120.0, 90.0, 110.0, 5.0)
            .unwrap();
        let mut feed = ReplayFeed::new(vec![archived], Arc::clone(&clock));

        let candle = feed.latest_candle("BTCUSDT", t0()).unwrap().unwrap();

        assert_eq!(candle, archived);
        assert_eq!(clock.now(), archived.timestamp);
        assert_eq!(feed.latest_candle("BTCUSDT", t0()).unwrap(), None);
    }

    #[test]
    fn test_price_feeds_step_flat_candles() {
        let mut feed = FlakyFeed {
            price: 45000.0,
            calls: 0,
            failing: Vec::new(),
        };

        let candle = feed.latest_candle("BTCUSDT", t0()).unwrap().unwrap();

        assert_eq!(candle, Candle::from_price(t0(), 45000.0));
    }

    #[tokio::test]
    async fn test_paper_replay_matches_backtest_orders() {
        //wide ranges so the adaptive spacing sees more than close-to-close moves
        let candles: Vec<Candle> = [
            (100.0, 108.0, 96.0, 104.0),
            (104.0, 110.0, 95.0, 98.0),
            (98.0, 106.0, 92.0, 95.0),
            (95.0, 104.0, 90.0, 102.0),
            (102.0, 112.0, 99.0, 108.0),
            (108.0, 114.0, 100.0, 101.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| {
            Candle::new(t0() + chrono::Duration::hours(i as i64), open, high, low, close, 1.0)
                .unwrap()
        })
        .collect();
        let config = GridConfig::new("BTCUSDT", 90.0, 115.0, 5, 100.0).with_spacing(
            GridSpacing::Adaptive(AdaptiveSpacing {
                factor: 0.5,
                min_spacing: 2.0,
                max_spacing: 10.0,
                atr_period: 2,
            }),
        );

        let mut backtest_engine = GridEngine::configure(config.clone()).unwrap();
        let backtest = BacktestRunner::new(BacktestConfig {
            initial_capital: 1000.0,
            fee_rate: 0.0,
        })
        .run(&candles, candles[0].timestamp, candles[5].timestamp, &mut backtest_engine);

        let clock = Arc::new(ManualClock::new(t0()));
        let feed = ReplayFeed::new(candles, Arc::clone(&clock));
        let bot = LiveBot::new(
            Box::new(GridEngine::configure(config).unwrap()),
            feed,
            Ledger::new(1000.0),
            clock,
            Duration::from_millis(1),
            0.0,
        )
        .unwrap();
        let (_tx, rx) = watch::channel(false);

        let report = bot.run(rx).await;

        assert_eq!(report.ticks, 6);
        assert!(!backtest.orders.is_empty());
        assert_eq!(report.venue.trade_log, backtest.orders);
    }
}
