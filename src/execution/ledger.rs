use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::db::Store;
use crate::models::{Order, TradeRecord, TradeSide};
use crate::{Error, Result};

/// Applies orders against portfolios and records the audit trail.
///
/// Every execution against a given portfolio is serialized on a
/// per-portfolio async lock: two concurrent buys that would jointly
/// overdraw cash cannot both pass validation. Different portfolios
/// proceed fully in parallel. The store's buy/sell operations are
/// additionally required to be transactional on their own.
pub struct Ledger {
    store: Arc<dyn Store>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn portfolio_lock(&self, portfolio_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(portfolio_id).or_default().clone()
    }

    /// Validate and apply one order atomically, appending a TradeRecord.
    ///
    /// Rejections (`InvalidQuantity`, `InsufficientFunds`,
    /// `InsufficientPosition`) leave the portfolio untouched and are
    /// returned synchronously to the caller.
    pub async fn execute(&self, order: &Order) -> Result<TradeRecord> {
        if order.quantity <= 0 {
            return Err(Error::InvalidQuantity(order.quantity));
        }

        let lock = self.portfolio_lock(order.portfolio_id);
        let _guard = lock.lock().await;

        let portfolio = self.store.portfolio(order.portfolio_id).await?;

        match order.side {
            TradeSide::Buy => {
                let cost = order.quantity as f64 * order.price;
                if cost > portfolio.cash_balance {
                    return Err(Error::InsufficientFunds {
                        required: cost,
                        available: portfolio.cash_balance,
                    });
                }
                self.store
                    .buy_instrument(
                        order.portfolio_id,
                        order.instrument_id,
                        order.quantity,
                        order.price,
                    )
                    .await?;
            }
            TradeSide::Sell => {
                let held = self
                    .store
                    .position(order.portfolio_id, order.instrument_id)
                    .await?
                    .map(|p| p.quantity)
                    .unwrap_or(0);
                if held < order.quantity {
                    return Err(Error::InsufficientPosition {
                        held,
                        requested: order.quantity,
                    });
                }
                self.store
                    .sell_instrument(
                        order.portfolio_id,
                        order.instrument_id,
                        order.quantity,
                        order.price,
                    )
                    .await?;
            }
        }

        let record = TradeRecord {
            id: Uuid::new_v4(),
            agent_id: order.agent_id,
            portfolio_id: order.portfolio_id,
            instrument_id: order.instrument_id,
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            reason: order.reason.clone(),
            executed_at: Utc::now(),
        };
        self.store.record_trade(&record).await?;

        tracing::info!(
            portfolio = %order.portfolio_id,
            side = order.side.as_str(),
            quantity = order.quantity,
            price = order.price,
            "executed trade"
        );

        Ok(record)
    }
}
