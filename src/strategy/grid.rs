use crate::config::{AdaptiveSpacing, ConfigError, GridConfig, GridSpacing, MAX_GRID_LEVELS};
use crate::data::Candle;
use crate::engine::execution::{SimulatedOrder, Venue};
use crate::portfolio::Position;
use crate::strategy::{atr, StepReport, StrategyEngine, TradeTally};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};

//stable identity of a grid level, survives adaptive rebuilds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId(pub u32);

//one price threshold and the position bought at it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub id: LevelId,
    pub price: f64,
    pub position: Position,
}

impl GridLevel {
    //empty levels may buy, filled levels wait for the next level up to sell
    pub fn is_filled(&self) -> bool {
        !self.position.is_flat()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStats {
    pub buy_count: usize,
    pub sell_count: usize,
    pub win_count: usize,
    pub forced_closes: usize,
    pub total_volume: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub total_fees: f64,
    //profit folded back into the order size
    pub reinvested: f64,
}

//grid trading engine: buys empty levels at or above the price, sells a level
//once the price reaches the next level up
#[derive(Debug, Clone)]
pub struct GridEngine {
    config: GridConfig,
    //ascending by price
    levels: IndexMap<LevelId, GridLevel>,
    next_level_id: u32,
    //grows with reinvested profit, starts at the configured amount
    investment_per_level: f64,
    //recent candles for adaptive spacing
    atr_window: VecDeque<Candle>,
    stats: GridStats,
}

//splits [lower, upper] into `count` levels; the end levels sit exactly on the bounds
pub fn partition(lower: f64, upper: f64, count: usize, geometric: bool) -> Vec<f64> {
    let steps = (count - 1) as f64;
    let mut levels: Vec<f64> = if geometric {
        let ratio = (upper / lower).powf(1.0 / steps);
        (0..count).map(|i| lower * ratio.powi(i as i32)).collect()
    } else {
        let spacing = (upper - lower) / steps;
        (0..count).map(|i| lower + i as f64 * spacing).collect()
    };

    levels[count - 1] = upper;
    levels.sort_by(|a, b| a.total_cmp(b));
    levels
}

fn same_price(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

impl GridEngine {
    //validates the config and lays out the initial levels
    pub fn configure(config: GridConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let geometric = matches!(config.spacing, GridSpacing::Geometric);
        let prices = partition(
            config.lower_bound,
            config.upper_bound,
            config.level_count,
            geometric,
        );

        let mut engine = GridEngine {
            investment_per_level: config.investment_per_level,
            config,
            levels: IndexMap::new(),
            next_level_id: 0,
            atr_window: VecDeque::new(),
            stats: GridStats::default(),
        };
        for price in prices {
            let id = engine.allocate_id();
            engine.levels.insert(
                id,
                GridLevel {
                    id,
                    price,
                    position: Position::new(),
                },
            );
        }

        info!(
            symbol = %engine.config.symbol,
            levels = engine.levels.len(),
            lower = engine.config.lower_bound,
            upper = engine.config.upper_bound,
            "grid engine configured"
        );

        Ok(engine)
    }

    fn allocate_id(&mut self) -> LevelId {
        let id = LevelId(self.next_level_id);
        self.next_level_id += 1;
        id
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn stats(&self) -> &GridStats {
        &self.stats
    }

    //level prices, ascending
    pub fn level_prices(&self) -> Vec<f64> {
        self.levels.values().map(|level| level.price).collect()
    }

    pub fn levels(&self) -> impl Iterator<Item = &GridLevel> {
        self.levels.values()
    }

    //order size of the next buy
    pub fn investment_per_level(&self) -> f64 {
        self.investment_per_level
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn in_range(&self, price: f64) -> bool {
        price >= self.config.lower_bound && price <= self.config.upper_bound
    }

    //evaluates every level against the current price, lowest level first
    pub fn step(
        &mut self,
        price: f64,
        fee_rate: f64,
        timestamp: DateTime<Utc>,
        venue: &mut dyn Venue,
    ) -> StepReport {
        let mut report = StepReport::default();

        if !self.config.enabled || !price.is_finite() || price <= 0.0 {
            return report;
        }

        //outside the grid nothing happens until the price comes back
        if !self.in_range(price) {
            trace!(symbol = %self.config.symbol, price, "price outside grid bounds");
            return report;
        }

        for index in 0..self.levels.len() {
            let next_price = self.levels.get_index(index + 1).map(|(_, next)| next.price);
            let level = match self.levels.get_index(index) {
                Some((_, level)) => *level,
                None => break,
            };

            if price <= level.price && !level.is_filled() {
                if let Some(order) = self.try_buy(&level, price, fee_rate, timestamp, venue) {
                    report.orders.push(order);
                }
            }

            let level = match self.levels.get_index(index) {
                Some((_, level)) => *level,
                None => break,
            };
            if let Some(next_price) = next_price {
                if level.is_filled() && price >= next_price {
                    if let Some((order, pnl)) =
                        self.try_sell(&level, price, fee_rate, timestamp, venue)
                    {
                        report.realized_pnl += pnl;
                        report.orders.push(order);
                    }
                }
            }
        }

        report
    }

    fn try_buy(
        &mut self,
        level: &GridLevel,
        price: f64,
        fee_rate: f64,
        timestamp: DateTime<Utc>,
        venue: &mut dyn Venue,
    ) -> Option<SimulatedOrder> {
        let investment = self.investment_per_level;
        if !venue.can_trade(investment, &self.config.symbol) {
            trace!(level = level.id.0, "buy skipped by capital gate");
            return None;
        }

        let fee = investment * fee_rate;
        let quantity = (investment - fee) / price;
        let order = SimulatedOrder::buy(&self.config.symbol, quantity, price, fee, timestamp);

        if let Err(err) = venue.submit(&order) {
            trace!(level = level.id.0, %err, "buy not executed");
            return None;
        }

        if let Some(slot) = self.levels.get_mut(&level.id) {
            slot.position = Position::opened(quantity, price);
        }
        self.stats.buy_count += 1;
        self.stats.total_volume += order.notional();
        self.stats.total_fees += fee;

        debug!(
            symbol = %self.config.symbol,
            level = level.price,
            price,
            quantity,
            "grid buy"
        );
        Some(order)
    }

    fn try_sell(
        &mut self,
        level: &GridLevel,
        price: f64,
        fee_rate: f64,
        timestamp: DateTime<Utc>,
        venue: &mut dyn Venue,
    ) -> Option<(SimulatedOrder, f64)> {
        let quantity = level.position.quantity;
        let proceeds = quantity * price;
        let fee = proceeds * fee_rate;
        let order = SimulatedOrder::sell(&self.config.symbol, quantity, price, fee, timestamp);

        if let Err(err) = venue.submit(&order) {
            trace!(level = level.id.0, %err, "sell not executed");
            return None;
        }

        let entry = level.position.average_entry_price;
        let pnl = (price - entry) * quantity;

        if let Some(slot) = self.levels.get_mut(&level.id) {
            slot.position = Position::new();
        }
        self.record_sell(price, entry, pnl, proceeds, fee);

        debug!(
            symbol = %self.config.symbol,
            level = level.price,
            price,
            quantity,
            pnl,
            "grid sell"
        );
        self.reinvest(pnl);
        Some((order, pnl))
    }

    //spreads the reinvested share of a profitable sell over every level's order size
    fn reinvest(&mut self, profit: f64) {
        let reinvestment = match self.config.reinvestment {
            Some(reinvestment) => reinvestment,
            None => return,
        };
        if profit <= 0.0 || profit < reinvestment.profit_threshold {
            return;
        }

        let amount = profit * reinvestment.rate;
        let committed = self.investment_per_level * self.levels.len() as f64;
        self.investment_per_level *= 1.0 + amount / committed;
        self.stats.reinvested += amount;

        info!(
            symbol = %self.config.symbol,
            profit,
            amount,
            investment_per_level = self.investment_per_level,
            "profit reinvested"
        );
    }

    fn record_sell(&mut self, price: f64, entry: f64, pnl: f64, proceeds: f64, fee: f64) {
        self.stats.sell_count += 1;
        if price >= entry {
            self.stats.win_count += 1;
        }
        if pnl >= 0.0 {
            self.stats.total_profit += pnl;
        } else {
            self.stats.total_loss += -pnl;
        }
        self.stats.total_volume += proceeds;
        self.stats.total_fees += fee;
    }

    //feeds a candle to the atr window and rebuilds the levels when the
    //volatility-derived level count changes
    fn adapt(
        &mut self,
        adaptive: AdaptiveSpacing,
        candle: &Candle,
        fee_rate: f64,
        venue: &mut dyn Venue,
    ) -> StepReport {
        self.atr_window.push_back(*candle);
        while self.atr_window.len() > adaptive.atr_period + 1 {
            self.atr_window.pop_front();
        }

        let current_atr = match atr(self.atr_window.make_contiguous(), adaptive.atr_period) {
            Some(value) if value > 0.0 => value,
            _ => return StepReport::default(),
        };

        let spacing = (current_atr * adaptive.factor).clamp(adaptive.min_spacing, adaptive.max_spacing);
        let range = self.config.upper_bound - self.config.lower_bound;
        let count = ((range / spacing).floor() as usize).clamp(2, MAX_GRID_LEVELS);

        if count == self.levels.len() {
            return StepReport::default();
        }

        info!(
            symbol = %self.config.symbol,
            atr = current_atr,
            spacing,
            from = self.levels.len(),
            to = count,
            "rebuilding grid levels"
        );
        self.rebuild(count, candle.close, fee_rate, candle.timestamp, venue)
    }

    //lays out `count` fresh levels, carrying over filled levels whose price
    //still exists and force-closing the rest
    pub fn rebuild(
        &mut self,
        count: usize,
        price: f64,
        fee_rate: f64,
        timestamp: DateTime<Utc>,
        venue: &mut dyn Venue,
    ) -> StepReport {
        let mut report = StepReport::default();
        let count = count.clamp(2, MAX_GRID_LEVELS);
        let prices = partition(self.config.lower_bound, self.config.upper_bound, count, false);

        let old_levels: Vec<GridLevel> = self.levels.values().copied().collect();
        let mut slots: Vec<Option<GridLevel>> = vec![None; prices.len()];
        let mut orphans = Vec::new();

        for old in old_levels {
            let matched = prices
                .iter()
                .position(|&candidate| same_price(candidate, old.price))
                .filter(|&i| slots[i].is_none());

            match matched {
                Some(i) => {
                    slots[i] = Some(GridLevel {
                        price: prices[i],
                        ..old
                    })
                }
                None if old.is_filled() => {
                    match self.force_close(&old, price, fee_rate, timestamp, venue) {
                        Some((order, pnl)) => {
                            report.realized_pnl += pnl;
                            report.orders.push(order);
                        }
                        //keep the position on its old price until a close succeeds
                        None => orphans.push(old),
                    }
                }
                None => {}
            }
        }

        let mut rebuilt: Vec<GridLevel> = Vec::with_capacity(prices.len() + orphans.len());
        for (slot, &level_price) in slots.into_iter().zip(prices.iter()) {
            let level = match slot {
                Some(level) => level,
                None => GridLevel {
                    id: self.allocate_id(),
                    price: level_price,
                    position: Position::new(),
                },
            };
            rebuilt.push(level);
        }
        rebuilt.extend(orphans);
        rebuilt.sort_by(|a, b| a.price.total_cmp(&b.price));

        self.levels = rebuilt.into_iter().map(|level| (level.id, level)).collect();
        report
    }

    fn force_close(
        &mut self,
        level: &GridLevel,
        price: f64,
        fee_rate: f64,
        timestamp: DateTime<Utc>,
        venue: &mut dyn Venue,
    ) -> Option<(SimulatedOrder, f64)> {
        let quantity = level.position.quantity;
        let proceeds = quantity * price;
        let fee = proceeds * fee_rate;
        let order = SimulatedOrder::sell(&self.config.symbol, quantity, price, fee, timestamp);

        if let Err(err) = venue.submit(&order) {
            warn!(level = level.price, %err, "forced close of removed level failed, keeping it");
            return None;
        }

        let entry = level.position.average_entry_price;
        let pnl = (price - entry) * quantity;
        self.record_sell(price, entry, pnl, proceeds, fee);
        self.stats.forced_closes += 1;

        info!(
            symbol = %self.config.symbol,
            level = level.price,
            price,
            quantity,
            pnl,
            "force-closed position of removed level"
        );
        Some((order, pnl))
    }

    //total realized pnl of completed sells
    pub fn realized_pnl(&self) -> f64 {
        self.stats.total_profit - self.stats.total_loss
    }
}

impl StrategyEngine for GridEngine {
    fn name(&self) -> &str {
        "Grid"
    }

    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    fn on_candle(&mut self, candle: &Candle, fee_rate: f64, venue: &mut dyn Venue) -> StepReport {
        let mut report = StepReport::default();

        if let GridSpacing::Adaptive(adaptive) = self.config.spacing {
            if self.config.enabled {
                report.merge(self.adapt(adaptive, candle, fee_rate, venue));
            }
        }

        report.merge(self.step(candle.close, fee_rate, candle.timestamp, venue));
        report
    }

    fn position_quantity(&self) -> f64 {
        self.levels.values().map(|level| level.position.quantity).sum()
    }

    fn tally(&self, _mark_price: f64) -> TradeTally {
        TradeTally {
            trade_count: self.stats.buy_count + self.stats.sell_count,
            win_count: self.stats.win_count,
            total_fees: self.stats.total_fees,
            realized_pnl: self.realized_pnl(),
        }
    }
}
