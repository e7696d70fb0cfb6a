// Derived statistics over price history
pub mod volatility;

pub use volatility::{calculate_volatility, DEFAULT_WINDOW};
