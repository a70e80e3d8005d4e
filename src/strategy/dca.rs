use crate::config::{ConfigError, DcaConfig};
use crate::data::Candle;
use crate::engine::execution::{SimulatedOrder, Venue};
use crate::strategy::{StepReport, StrategyEngine, TradeTally};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

//pacing state of the dca engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DcaState {
    pub last_buy: Option<DateTime<Utc>>,
    pub buy_count: u32,
    pub total_invested: f64,
    pub total_quantity: f64,
    pub average_price: f64,
}

impl DcaState {
    //inactive until the first buy
    pub fn is_active(&self) -> bool {
        self.buy_count > 0
    }
}

#[derive(Debug, Clone)]
pub struct DcaEngine {
    config: DcaConfig,
    state: DcaState,
    total_fees: f64,
}

impl DcaEngine {
    pub fn configure(config: DcaConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        info!(
            symbol = %config.symbol,
            amount = config.investment_amount,
            max = config.max_investments,
            "dca engine configured"
        );

        Ok(DcaEngine {
            config,
            state: DcaState::default(),
            total_fees: 0.0,
        })
    }

    pub fn config(&self) -> &DcaConfig {
        &self.config
    }

    pub fn state(&self) -> &DcaState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.buy_count >= self.config.max_investments
    }

    //earliest time the next buy may happen
    //none once the cap is reached or when the interval runs past the calendar
    pub fn next_buy_at(&self) -> Option<DateTime<Utc>> {
        if self.is_exhausted() {
            return None;
        }
        match self.state.last_buy {
            Some(last) => last.checked_add_signed(self.config.interval),
            None => Some(DateTime::<Utc>::MIN_UTC),
        }
    }

    //buys a fixed amount when the interval has elapsed and the cap and
    //price ceiling allow it; the fee is paid on top of the amount
    pub fn step(
        &mut self,
        price: f64,
        now: DateTime<Utc>,
        fee_rate: f64,
        venue: &mut dyn Venue,
    ) -> Option<SimulatedOrder> {
        if !self.config.enabled || !price.is_finite() || price <= 0.0 {
            return None;
        }

        if let Some(last) = self.state.last_buy {
            if now - last < self.config.interval {
                return None;
            }
        }

        if self.is_exhausted() {
            return None;
        }

        if self.config.price_threshold > 0.0 && price > self.config.price_threshold {
            trace!(price, ceiling = self.config.price_threshold, "dca price above ceiling");
            return None;
        }

        let amount = self.config.investment_amount;
        let fee = amount * fee_rate;
        if !venue.can_trade(amount + fee, &self.config.symbol) {
            trace!(symbol = %self.config.symbol, "dca buy skipped by capital gate");
            return None;
        }

        let quantity = amount / price;
        let order = SimulatedOrder::buy(&self.config.symbol, quantity, price, fee, now);
        if let Err(err) = venue.submit(&order) {
            trace!(%err, "dca buy not executed");
            return None;
        }

        let state = &mut self.state;
        state.average_price = (state.total_invested + amount) / (state.total_quantity + quantity);
        state.total_invested += amount;
        state.total_quantity += quantity;
        state.buy_count += 1;
        state.last_buy = Some(now);
        self.total_fees += fee;

        debug!(
            symbol = %self.config.symbol,
            price,
            quantity,
            buys = self.state.buy_count,
            average = self.state.average_price,
            "dca buy"
        );

        if self.is_exhausted() {
            info!(
                symbol = %self.config.symbol,
                invested = self.state.total_invested,
                "dca reached its investment cap"
            );
        }

        Some(order)
    }
}

impl StrategyEngine for DcaEngine {
    fn name(&self) -> &str {
        "DCA"
    }

    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    fn on_candle(&mut self, candle: &Candle, fee_rate: f64, venue: &mut dyn Venue) -> StepReport {
        let orders = self
            .step(candle.close, candle.timestamp, fee_rate, venue)
            .into_iter()
            .collect();
        StepReport {
            orders,
            realized_pnl: 0.0,
        }
    }

    fn position_quantity(&self) -> f64 {
        self.state.total_quantity
    }

    //dca never sells, so every buy counts as a win when the mark is above the average
    fn tally(&self, mark_price: f64) -> TradeTally {
        let trades = self.state.buy_count as usize;
        let in_profit = self.state.is_active() && mark_price > self.state.average_price;
        TradeTally {
            trade_count: trades,
            win_count: if in_profit { trades } else { 0 },
            total_fees: self.total_fees,
            realized_pnl: 0.0,
        }
    }
}
