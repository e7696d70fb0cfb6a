// Order application against portfolio cash and positions
pub mod ledger;

pub use ledger::Ledger;
