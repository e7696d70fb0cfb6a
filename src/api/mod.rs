// External market-data feeds
pub mod alphavantage;
pub mod simulated;

pub use alphavantage::AlphaVantageClient;
pub use simulated::SimulatedFeed;

use async_trait::async_trait;

use crate::Result;

/// Latest quote for one symbol
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
    /// Trading day the quote refers to, as reported by the feed
    pub as_of: String,
}

/// External quote source polled by the price feed scheduler.
///
/// A rate-limited or otherwise unusable response surfaces as
/// `Error::FeedUnavailable`, which the scheduler treats as
/// "skip this instrument", never as something to raise to a user.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote>;
}
