use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;

use crate::api::{Quote, QuoteFeed};
use crate::{Error, Result};

const ALPHAVANTAGE_API_BASE: &str = "https://www.alphavantage.co/query";
const RATE_LIMIT_RPM: u32 = 5; // Free tier: 5 requests per minute

// Type alias for the rate limiter to simplify signatures
type AlphaVantageRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Alpha Vantage GLOBAL_QUOTE endpoint
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<AlphaVantageRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    /// Present when the API key hit its rate limit
    #[serde(rename = "Note")]
    note: Option<String>,
    /// Present for informational / demo-key responses
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GlobalQuote {
    #[serde(rename = "01. symbol", default)]
    symbol: Option<String>,
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day", default)]
    latest_trading_day: Option<String>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, ALPHAVANTAGE_API_BASE.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());

        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let url = format!(
            "{}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, symbol, self.api_key
        );

        let response: GlobalQuoteResponse = self.client.get(&url).send().await?.json().await?;

        // Rate-limit and informational payloads come back as 200 OK
        if let Some(note) = response.note {
            return Err(Error::FeedUnavailable(format!("rate limited: {note}")));
        }
        if let Some(info) = response.information {
            return Err(Error::FeedUnavailable(format!(
                "informational response: {info}"
            )));
        }

        let quote = response
            .global_quote
            .ok_or_else(|| Error::FeedUnavailable(format!("no quote returned for {symbol}")))?;

        let price: f64 = quote
            .price
            .as_deref()
            .ok_or_else(|| Error::FeedUnavailable(format!("empty quote for {symbol}")))?
            .parse()
            .map_err(|e| Error::FeedUnavailable(format!("unparseable price for {symbol}: {e}")))?;

        let change_percent = quote
            .change_percent
            .as_deref()
            .and_then(|s| s.trim_end_matches('%').parse().ok())
            .unwrap_or(0.0);
        let volume = quote
            .volume
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Ok(Quote {
            symbol: quote.symbol.unwrap_or_else(|| symbol.to_string()),
            price,
            change_percent,
            volume,
            as_of: quote.latest_trading_day.unwrap_or_default(),
        })
    }
}

#[async_trait::async_trait]
impl QuoteFeed for AlphaVantageClient {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        // Stay within the provider's request allowance regardless of caller pacing
        self.rate_limiter.until_ready().await;
        self.fetch_quote(symbol).await
    }
}
