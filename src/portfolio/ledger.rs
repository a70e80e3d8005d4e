use crate::engine::execution::{OrderSide, SimulatedOrder, Venue, VenueError};
use crate::portfolio::position::{Position, QTY_EPSILON};
use indexmap::IndexMap;

//in-memory capital ledger: the venue a backtest or paper run trades against
#[derive(Debug, Clone)]
pub struct Ledger {
    //initial capital
    pub initial_capital: f64,

    //current cash (proceeds credited, investments and fees debited)
    pub cash: f64,

    //open positions by symbol, in the order they were first traded
    pub positions: IndexMap<String, Position>,

    //every executed order
    pub trade_log: Vec<SimulatedOrder>,

    //fees paid so far
    pub total_fees: f64,
}

impl Ledger {
    //creates a ledger holding only cash
    pub fn new(initial_capital: f64) -> Self {
        Ledger {
            initial_capital,
            cash: initial_capital,
            positions: IndexMap::new(),
            trade_log: Vec::new(),
            total_fees: 0.0,
        }
    }

    //applies an executed order and returns the realized pnl it booked
    pub fn apply(&mut self, order: &SimulatedOrder) -> f64 {
        self.cash += order.cash_flow();
        self.total_fees += order.fee;

        let position = self
            .positions
            .entry(order.symbol.clone())
            .or_insert_with(Position::new);

        let realized = match order.side {
            OrderSide::Buy => {
                position.add(order.quantity, order.price);
                0.0
            }
            OrderSide::Sell => position.reduce(order.quantity, order.price),
        };

        self.trade_log.push(order.clone());
        realized
    }

    //returns the position for a symbol, or none if never traded
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    //held quantity of a symbol
    pub fn quantity(&self, symbol: &str) -> f64 {
        self.position(symbol).map(|p| p.quantity).unwrap_or(0.0)
    }

    //cash plus the position in `symbol` marked at `price`
    pub fn equity(&self, symbol: &str, price: f64) -> f64 {
        self.cash
            + self
                .position(symbol)
                .map(|p| p.market_value(price))
                .unwrap_or(0.0)
    }

    //open pnl of `symbol` against its average entry
    pub fn unrealized_pnl(&self, symbol: &str, price: f64) -> f64 {
        self.position(symbol)
            .map(|p| p.unrealized_pnl(price))
            .unwrap_or(0.0)
    }

    //returns total realized pnl across all positions
    pub fn total_realized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }
}

impl Venue for Ledger {
    fn can_trade(&self, amount: f64, _symbol: &str) -> bool {
        self.cash >= amount
    }

    fn submit(&mut self, order: &SimulatedOrder) -> Result<(), VenueError> {
        match order.side {
            OrderSide::Buy => {
                let cost = order.notional() + order.fee;
                if cost > self.cash + 1e-9 * cost.max(1.0) {
                    return Err(VenueError::Rejected(format!(
                        "insufficient cash: need {:.8}, have {:.8}",
                        cost, self.cash
                    )));
                }
            }
            OrderSide::Sell => {
                let held = self.quantity(&order.symbol);
                if held <= QTY_EPSILON || order.quantity > held * (1.0 + 1e-9) {
                    return Err(VenueError::Rejected(format!(
                        "insufficient {}: need {:.8}, have {:.8}",
                        order.symbol, order.quantity, held
                    )));
                }
            }
        }

        self.apply(order);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    #[test]
    fn test_buy_then_sell_updates_cash_and_fees() {
        let mut ledger = Ledger::new(1000.0);
        let now = Utc::now();

        ledger
            .submit(&SimulatedOrder::buy("BTCUSDT", 0.01, 40000.0, 0.4, now))
            .unwrap();
        assert_relative_eq!(ledger.cash, 599.6, epsilon = 1e-9);
        assert_relative_eq!(ledger.equity("BTCUSDT", 40000.0), 999.6, epsilon = 1e-9);

        ledger
            .submit(&SimulatedOrder::sell("BTCUSDT", 0.01, 45000.0, 0.45, now))
            .unwrap();
        assert_relative_eq!(ledger.cash, 1049.15, epsilon = 1e-9);
        assert_relative_eq!(ledger.total_fees, 0.85, epsilon = 1e-9);
        assert_relative_eq!(ledger.total_realized_pnl(), 50.0, epsilon = 1e-9);
        assert_eq!(ledger.trade_log.len(), 2);
    }

    #[test]
    fn test_rejects_overdraft_and_oversell() {
        let mut ledger = Ledger::new(100.0);
        let now = Utc::now();

        let overdraft = SimulatedOrder::buy("BTCUSDT", 1.0, 200.0, 0.0, now);
        assert!(!ledger.can_trade(200.0, "BTCUSDT"));
        assert!(matches!(ledger.submit(&overdraft), Err(VenueError::Rejected(_))));

        let oversell = SimulatedOrder::sell("BTCUSDT", 1.0, 200.0, 0.0, now);
        assert!(ledger.submit(&oversell).is_err());
        assert_eq!(ledger.cash, 100.0);
        assert!(ledger.trade_log.is_empty());
    }

    #[test]
    fn test_pnl_split_between_realized_and_open() {
        let mut ledger = Ledger::new(1000.0);
        let now = Utc::now();
        ledger.apply(&SimulatedOrder::buy("BTCUSDT", 0.02, 40000.0, 0.0, now));
        ledger.apply(&SimulatedOrder::sell("BTCUSDT", 0.01, 42000.0, 0.0, now));

        assert_relative_eq!(ledger.total_realized_pnl(), 20.0, epsilon = 1e-9);
        assert_relative_eq!(ledger.unrealized_pnl("BTCUSDT", 45000.0), 50.0, epsilon = 1e-9);
        assert_eq!(ledger.unrealized_pnl("ETHUSDT", 2000.0), 0.0);
        assert_relative_eq!(ledger.equity("BTCUSDT", 45000.0), 620.0 + 450.0, epsilon = 1e-9);
    }
}
