pub mod gate;
pub mod ledger;
pub mod position;

pub use gate::{AllowAll, GatedVenue, MaxExposure, RiskGate};
pub use ledger::Ledger;
pub use position::Position;
