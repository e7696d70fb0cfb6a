// Persistence surface: the trading pipeline only ever talks to `Store`
pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Instrument, Portfolio, Position, TradeRecord, TradingAgent};
use crate::Result;

/// Raw price observation as recorded by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Transactional data store behind the trading pipeline.
///
/// `buy_instrument` and `sell_instrument` must be atomic: they re-validate
/// funds/position and mutate cash, position and average price as one unit.
/// The in-process ledger serializes calls per portfolio on top of this,
/// but the store may not rely on that.
#[async_trait]
pub trait Store: Send + Sync {
    async fn instruments(&self) -> Result<Vec<Instrument>>;
    async fn instrument(&self, id: Uuid) -> Result<Instrument>;
    async fn update_instrument_price(&self, id: Uuid, price: f64) -> Result<()>;

    async fn append_price_history(&self, instrument_id: Uuid, price: f64) -> Result<()>;
    /// Most recent ticks first, capped at `limit`
    async fn price_history(&self, instrument_id: Uuid, limit: usize) -> Result<Vec<PriceTick>>;

    async fn portfolio(&self, id: Uuid) -> Result<Portfolio>;
    async fn position(&self, portfolio_id: Uuid, instrument_id: Uuid)
        -> Result<Option<Position>>;
    async fn positions(&self, portfolio_id: Uuid) -> Result<Vec<Position>>;

    async fn agents(&self) -> Result<Vec<TradingAgent>>;
    async fn agent(&self, id: Uuid) -> Result<TradingAgent>;

    /// Atomically debit cash and credit the position (weighted avg price)
    async fn buy_instrument(
        &self,
        portfolio_id: Uuid,
        instrument_id: Uuid,
        quantity: i64,
        price: f64,
    ) -> Result<()>;

    /// Atomically credit cash and debit the position (removed at zero)
    async fn sell_instrument(
        &self,
        portfolio_id: Uuid,
        instrument_id: Uuid,
        quantity: i64,
        price: f64,
    ) -> Result<()>;

    async fn record_trade(&self, trade: &TradeRecord) -> Result<()>;
    async fn trades(&self, portfolio_id: Uuid) -> Result<Vec<TradeRecord>>;
}
