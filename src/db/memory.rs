use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::{PriceTick, Store};
use crate::feed::DEFAULT_CAPACITY;
use crate::models::{Instrument, Portfolio, Position, RiskProfile, TradeRecord, TradingAgent};
use crate::{Error, Result};

/// In-memory store for demo mode and tests.
///
/// Mutations take the single write lock, which makes buy/sell atomic the
/// same way the Postgres transactions are.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<State>,
}

#[derive(Default)]
struct State {
    instruments: HashMap<Uuid, Instrument>,
    history: HashMap<Uuid, Vec<PriceTick>>,
    portfolios: HashMap<Uuid, Portfolio>,
    positions: HashMap<(Uuid, Uuid), Position>,
    agents: HashMap<Uuid, TradingAgent>,
    trades: Vec<TradeRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instrument(&self, symbol: &str, name: &str, price: f64) -> Instrument {
        let instrument = Instrument {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            current_price: price,
            volatility: None,
        };
        let mut state = self.inner.write().unwrap();
        state.instruments.insert(instrument.id, instrument.clone());
        instrument
    }

    pub fn add_portfolio(&self, owner: &str, cash_balance: f64) -> Portfolio {
        let portfolio = Portfolio {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            cash_balance,
        };
        let mut state = self.inner.write().unwrap();
        state.portfolios.insert(portfolio.id, portfolio.clone());
        portfolio
    }

    pub fn add_agent(
        &self,
        name: &str,
        profile: RiskProfile,
        portfolio_id: Uuid,
        cash_allocated: f64,
        max_position_fraction: f64,
    ) -> TradingAgent {
        let agent = TradingAgent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            profile,
            portfolio_id,
            cash_allocated,
            risk_score: match profile {
                RiskProfile::Conservative => 0.3,
                RiskProfile::Aggressive => 0.8,
            },
            max_position_fraction,
        };
        let mut state = self.inner.write().unwrap();
        state.agents.insert(agent.id, agent.clone());
        agent
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn instruments(&self) -> Result<Vec<Instrument>> {
        let state = self.inner.read().unwrap();
        Ok(state.instruments.values().cloned().collect())
    }

    async fn instrument(&self, id: Uuid) -> Result<Instrument> {
        let state = self.inner.read().unwrap();
        state
            .instruments
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("instrument {id}")))
    }

    async fn update_instrument_price(&self, id: Uuid, price: f64) -> Result<()> {
        let mut state = self.inner.write().unwrap();
        let instrument = state
            .instruments
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("instrument {id}")))?;
        instrument.current_price = price;
        Ok(())
    }

    async fn append_price_history(&self, instrument_id: Uuid, price: f64) -> Result<()> {
        let mut state = self.inner.write().unwrap();
        if !state.instruments.contains_key(&instrument_id) {
            return Err(Error::NotFound(format!("instrument {instrument_id}")));
        }
        let ticks = state.history.entry(instrument_id).or_default();
        ticks.push(PriceTick {
            price,
            recorded_at: Utc::now(),
        });
        // Same sliding window the Postgres store keeps
        while ticks.len() > DEFAULT_CAPACITY {
            ticks.remove(0);
        }
        Ok(())
    }

    async fn price_history(&self, instrument_id: Uuid, limit: usize) -> Result<Vec<PriceTick>> {
        let state = self.inner.read().unwrap();
        Ok(state
            .history
            .get(&instrument_id)
            .map(|ticks| ticks.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn portfolio(&self, id: Uuid) -> Result<Portfolio> {
        let state = self.inner.read().unwrap();
        state
            .portfolios
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("portfolio {id}")))
    }

    async fn position(
        &self,
        portfolio_id: Uuid,
        instrument_id: Uuid,
    ) -> Result<Option<Position>> {
        let state = self.inner.read().unwrap();
        Ok(state.positions.get(&(portfolio_id, instrument_id)).cloned())
    }

    async fn positions(&self, portfolio_id: Uuid) -> Result<Vec<Position>> {
        let state = self.inner.read().unwrap();
        Ok(state
            .positions
            .values()
            .filter(|p| p.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }

    async fn agents(&self) -> Result<Vec<TradingAgent>> {
        let state = self.inner.read().unwrap();
        Ok(state.agents.values().cloned().collect())
    }

    async fn agent(&self, id: Uuid) -> Result<TradingAgent> {
        let state = self.inner.read().unwrap();
        state
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("agent {id}")))
    }

    async fn buy_instrument(
        &self,
        portfolio_id: Uuid,
        instrument_id: Uuid,
        quantity: i64,
        price: f64,
    ) -> Result<()> {
        if quantity <= 0 {
            return Err(Error::InvalidQuantity(quantity));
        }
        let mut state = self.inner.write().unwrap();

        let portfolio = state
            .portfolios
            .get_mut(&portfolio_id)
            .ok_or_else(|| Error::NotFound(format!("portfolio {portfolio_id}")))?;

        let cost = quantity as f64 * price;
        if cost > portfolio.cash_balance {
            return Err(Error::InsufficientFunds {
                required: cost,
                available: portfolio.cash_balance,
            });
        }
        portfolio.cash_balance -= cost;

        let position = state
            .positions
            .entry((portfolio_id, instrument_id))
            .or_insert(Position {
                portfolio_id,
                instrument_id,
                quantity: 0,
                avg_price: 0.0,
            });
        let prior_cost = position.avg_price * position.quantity as f64;
        position.quantity += quantity;
        position.avg_price = (prior_cost + cost) / position.quantity as f64;

        Ok(())
    }

    async fn sell_instrument(
        &self,
        portfolio_id: Uuid,
        instrument_id: Uuid,
        quantity: i64,
        price: f64,
    ) -> Result<()> {
        if quantity <= 0 {
            return Err(Error::InvalidQuantity(quantity));
        }
        let mut state = self.inner.write().unwrap();

        if !state.portfolios.contains_key(&portfolio_id) {
            return Err(Error::NotFound(format!("portfolio {portfolio_id}")));
        }

        let key = (portfolio_id, instrument_id);
        let held = state.positions.get(&key).map(|p| p.quantity).unwrap_or(0);
        if held < quantity {
            return Err(Error::InsufficientPosition {
                held,
                requested: quantity,
            });
        }

        if held == quantity {
            // Quantity 0 is equivalent to absence
            state.positions.remove(&key);
        } else if let Some(position) = state.positions.get_mut(&key) {
            position.quantity -= quantity;
        }

        if let Some(portfolio) = state.portfolios.get_mut(&portfolio_id) {
            portfolio.cash_balance += quantity as f64 * price;
        }

        Ok(())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> Result<()> {
        let mut state = self.inner.write().unwrap();
        state.trades.push(trade.clone());
        Ok(())
    }

    async fn trades(&self, portfolio_id: Uuid) -> Result<Vec<TradeRecord>> {
        let state = self.inner.read().unwrap();
        Ok(state
            .trades
            .iter()
            .filter(|t| t.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_is_capped_and_newest_first() {
        let store = MemoryStore::new();
        let instrument = store.add_instrument("AAPL", "Apple Inc.", 100.0);

        for i in 0..(DEFAULT_CAPACITY + 20) {
            store
                .append_price_history(instrument.id, 100.0 + i as f64)
                .await
                .unwrap();
        }

        let all = store
            .price_history(instrument.id, DEFAULT_CAPACITY * 2)
            .await
            .unwrap();
        assert_eq!(all.len(), DEFAULT_CAPACITY);
        // Newest first
        assert_eq!(all[0].price, 100.0 + (DEFAULT_CAPACITY + 19) as f64);

        let few = store.price_history(instrument.id, 3).await.unwrap();
        assert_eq!(few.len(), 3);
    }

    #[tokio::test]
    async fn test_buy_then_sell_round_trip() {
        let store = MemoryStore::new();
        let portfolio = store.add_portfolio("demo", 5_000.0);
        let instrument = store.add_instrument("MSFT", "Microsoft", 50.0);

        store
            .buy_instrument(portfolio.id, instrument.id, 10, 50.0)
            .await
            .unwrap();
        store
            .sell_instrument(portfolio.id, instrument.id, 10, 55.0)
            .await
            .unwrap();

        let portfolio = store.portfolio(portfolio.id).await.unwrap();
        assert_eq!(portfolio.cash_balance, 5_000.0 - 500.0 + 550.0);
        assert!(store
            .position(portfolio.id, instrument.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            store.instrument(id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(store.portfolio(id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.agent(id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            store.update_instrument_price(id, 10.0).await,
            Err(Error::NotFound(_))
        ));
    }
}
