// Instrument scoring per agent risk profile
pub mod recommendation;

pub use recommendation::{recommend, Recommendation, BUY_THRESHOLD, SELL_THRESHOLD};
