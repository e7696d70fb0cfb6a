use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Feed returned no usable quote (rate limited, unknown symbol,
    /// malformed payload).
    #[error("quote feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("insufficient funds: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient position: hold {held}, requested {requested}")]
    InsufficientPosition { held: i64, requested: i64 },

    #[error("order quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// Not enough price ticks to compute a return series.
    #[error("not enough price history")]
    InsufficientHistory,

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::FeedUnavailable(e.to_string())
    }
}
