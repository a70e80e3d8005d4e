use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

//order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

//an order produced by an engine step, consumed by a venue within the same step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

impl SimulatedOrder {
    pub fn buy(
        symbol: &str,
        quantity: f64,
        price: f64,
        fee: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        SimulatedOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity,
            price,
            fee,
            timestamp,
        }
    }

    pub fn sell(
        symbol: &str,
        quantity: f64,
        price: f64,
        fee: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        SimulatedOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            quantity,
            price,
            fee,
            timestamp,
        }
    }

    //returns the notional value of the order
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }

    //cash moved by the order: negative for buys, positive for sells, fees included
    pub fn cash_flow(&self) -> f64 {
        match self.side {
            OrderSide::Buy => -(self.notional() + self.fee),
            OrderSide::Sell => self.notional() - self.fee,
        }
    }
}

//reasons a venue turns an order away; engines treat both as a skipped opportunity
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("order submission cancelled")]
    Cancelled,
}

//where orders go: the backtest ledger, a paper account or a live exchange adapter
pub trait Venue {
    //capital and risk gate, queried before every buy
    fn can_trade(&self, amount: f64, symbol: &str) -> bool;

    //executes an order; on error the engine leaves its state untouched
    fn submit(&mut self, order: &SimulatedOrder) -> Result<(), VenueError>;
}

impl<V: Venue + ?Sized> Venue for Box<V> {
    fn can_trade(&self, amount: f64, symbol: &str) -> bool {
        (**self).can_trade(amount, symbol)
    }

    fn submit(&mut self, order: &SimulatedOrder) -> Result<(), VenueError> {
        (**self).submit(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_flow_includes_fees() {
        let now = Utc::now();
        let buy = SimulatedOrder::buy("BTCUSDT", 0.5, 100.0, 1.0, now);
        let sell = SimulatedOrder::sell("BTCUSDT", 0.5, 120.0, 1.0, now);

        assert_eq!(buy.cash_flow(), -51.0);
        assert_eq!(sell.cash_flow(), 59.0);
    }
}
