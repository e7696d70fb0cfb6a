pub mod api;
pub mod db;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod service;
pub mod strategy;

pub use error::{Error, Result};
pub use models::*;
pub use service::{InstrumentSnapshot, TradingService};
