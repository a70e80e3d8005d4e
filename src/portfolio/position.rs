use serde::{Deserialize, Serialize};

//quantities below this are treated as flat
pub const QTY_EPSILON: f64 = 1e-12;

//a long position with a quantity-weighted average entry price
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    //held quantity, 0 when flat
    pub quantity: f64,

    //average entry price
    pub average_entry_price: f64,

    //realized pnl from closed quantity
    pub realized_pnl: f64,
}

impl Position {
    //creates a new flat position
    pub fn new() -> Self {
        Position::default()
    }

    //creates a position opened by a single fill
    pub fn opened(quantity: f64, price: f64) -> Self {
        Position {
            quantity,
            average_entry_price: price,
            realized_pnl: 0.0,
        }
    }

    //returns true if nothing is held
    pub fn is_flat(&self) -> bool {
        self.quantity <= QTY_EPSILON
    }

    //adds to the position, re-averaging the entry price
    pub fn add(&mut self, quantity: f64, price: f64) {
        if self.is_flat() {
            self.quantity = quantity;
            self.average_entry_price = price;
            return;
        }

        let total_qty = self.quantity + quantity;
        let total_cost = self.average_entry_price * self.quantity + price * quantity;
        self.average_entry_price = total_cost / total_qty;
        self.quantity = total_qty;
    }

    //reduces the position and returns the realized pnl of the closed part
    pub fn reduce(&mut self, quantity: f64, price: f64) -> f64 {
        let close_qty = quantity.min(self.quantity);
        let realized = (price - self.average_entry_price) * close_qty;
        self.realized_pnl += realized;
        self.quantity -= close_qty;

        //if flat, reset entry price
        if self.is_flat() {
            self.quantity = 0.0;
            self.average_entry_price = 0.0;
        }

        realized
    }

    //calculates unrealized pnl at a given price
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.is_flat() {
            return 0.0;
        }
        (price - self.average_entry_price) * self.quantity
    }

    //mark-to-market value of the held quantity
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_reaverages_entry() {
        let mut position = Position::opened(1.0, 100.0);
        position.add(1.0, 50.0);

        assert_eq!(position.quantity, 2.0);
        assert_relative_eq!(position.average_entry_price, 75.0, epsilon = 1e-9);
    }

    #[test]
    fn test_full_reduce_realizes_pnl_and_resets() {
        let mut position = Position::opened(2.0, 100.0);
        let pnl = position.reduce(2.0, 110.0);

        assert_relative_eq!(pnl, 20.0, epsilon = 1e-9);
        assert!(position.is_flat());
        assert_eq!(position.average_entry_price, 0.0);
        assert_relative_eq!(position.realized_pnl, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_partial_reduce_keeps_entry() {
        let mut position = Position::opened(4.0, 10.0);
        let pnl = position.reduce(1.0, 8.0);

        assert_relative_eq!(pnl, -2.0, epsilon = 1e-9);
        assert_relative_eq!(position.quantity, 3.0, epsilon = 1e-9);
        assert_eq!(position.average_entry_price, 10.0);
        assert_relative_eq!(position.unrealized_pnl(12.0), 6.0, epsilon = 1e-9);
    }
}
