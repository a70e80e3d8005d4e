use crate::engine::execution::{OrderSide, SimulatedOrder, Venue, VenueError};
use std::collections::HashMap;

//yes/no capital and risk check queried before every buy
//a denial is a skipped opportunity, never an error
pub trait RiskGate {
    fn can_trade(&self, amount: f64, symbol: &str) -> bool;

    //observes executed orders so stateful gates can track exposure
    fn record(&mut self, _order: &SimulatedOrder) {}
}

//gate that never denies
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RiskGate for AllowAll {
    fn can_trade(&self, _amount: f64, _symbol: &str) -> bool {
        true
    }
}

//caps the open buy notional per symbol
#[derive(Debug, Clone)]
pub struct MaxExposure {
    limit: f64,
    exposure: HashMap<String, f64>,
}

impl MaxExposure {
    pub fn new(limit: f64) -> Self {
        MaxExposure {
            limit,
            exposure: HashMap::new(),
        }
    }

    //current open notional for a symbol
    pub fn exposure(&self, symbol: &str) -> f64 {
        self.exposure.get(symbol).copied().unwrap_or(0.0)
    }
}

impl RiskGate for MaxExposure {
    fn can_trade(&self, amount: f64, symbol: &str) -> bool {
        self.exposure(symbol) + amount <= self.limit
    }

    fn record(&mut self, order: &SimulatedOrder) {
        let exposure = self.exposure.entry(order.symbol.clone()).or_insert(0.0);
        match order.side {
            OrderSide::Buy => *exposure += order.notional() + order.fee,
            OrderSide::Sell => *exposure = (*exposure - order.notional()).max(0.0),
        }
    }
}

//a venue whose buys must also pass an external risk gate
#[derive(Debug, Clone)]
pub struct GatedVenue<V, G> {
    pub venue: V,
    pub gate: G,
}

impl<V: Venue, G: RiskGate> GatedVenue<V, G> {
    pub fn new(venue: V, gate: G) -> Self {
        GatedVenue { venue, gate }
    }
}

impl<V: Venue, G: RiskGate> Venue for GatedVenue<V, G> {
    fn can_trade(&self, amount: f64, symbol: &str) -> bool {
        self.gate.can_trade(amount, symbol) && self.venue.can_trade(amount, symbol)
    }

    fn submit(&mut self, order: &SimulatedOrder) -> Result<(), VenueError> {
        self.venue.submit(order)?;
        self.gate.record(order);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Ledger;
    use chrono::Utc;

    #[test]
    fn test_max_exposure_blocks_after_limit() {
        let mut venue = GatedVenue::new(Ledger::new(10_000.0), MaxExposure::new(250.0));
        let now = Utc::now();

        assert!(venue.can_trade(100.0, "BTCUSDT"));
        venue
            .submit(&SimulatedOrder::buy("BTCUSDT", 0.005, 40000.0, 0.0, now))
            .unwrap();
        venue
            .submit(&SimulatedOrder::buy("BTCUSDT", 0.0025, 40000.0, 0.0, now))
            .unwrap();

        //300 open, limit 250
        assert!(!venue.can_trade(100.0, "BTCUSDT"));
        assert!(venue.can_trade(100.0, "ETHUSDT"));

        venue
            .submit(&SimulatedOrder::sell("BTCUSDT", 0.005, 40000.0, 0.0, now))
            .unwrap();
        assert!(venue.can_trade(100.0, "BTCUSDT"));
    }

    #[test]
    fn test_rejected_order_is_not_recorded() {
        let mut venue = GatedVenue::new(Ledger::new(10.0), MaxExposure::new(1_000.0));
        let order = SimulatedOrder::buy("BTCUSDT", 1.0, 100.0, 0.0, Utc::now());

        assert!(venue.submit(&order).is_err());
        assert_eq!(venue.gate.exposure("BTCUSDT"), 0.0);
    }
}
