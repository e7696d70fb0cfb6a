use std::sync::Arc;

use crate::api::QuoteFeed;
use crate::db::Store;
use crate::execution::Ledger;
use crate::feed::{PriceFeedScheduler, PriceHistoryBuffer, RunState, SchedulerConfig, DEFAULT_CAPACITY};
use crate::indicators::{calculate_volatility, DEFAULT_WINDOW};
use crate::models::{Instrument, Order, PricePoint, TradeRecord};
use crate::strategy::{recommend, Recommendation};
use crate::{Error, Result};

/// An instrument together with its recent in-memory candle history.
#[derive(Debug, Clone)]
pub struct InstrumentSnapshot {
    pub instrument: Instrument,
    pub history: Vec<PricePoint>,
}

/// Ties the feed scheduler, strategy and ledger together behind one handle.
pub struct TradingService {
    store: Arc<dyn Store>,
    scheduler: Arc<PriceFeedScheduler>,
    ledger: Ledger,
    volatility_window: usize,
}

impl TradingService {
    pub fn new(store: Arc<dyn Store>, feed: Arc<dyn QuoteFeed>, config: SchedulerConfig) -> Self {
        let buffer = PriceHistoryBuffer::new(DEFAULT_CAPACITY);
        let scheduler = Arc::new(PriceFeedScheduler::new(
            feed,
            Arc::clone(&store),
            buffer,
            config,
        ));
        let ledger = Ledger::new(Arc::clone(&store));

        Self {
            store,
            scheduler,
            ledger,
            volatility_window: DEFAULT_WINDOW,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn start_scheduler(&self) {
        self.scheduler.start();
    }

    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    pub fn scheduler_state(&self) -> RunState {
        self.scheduler.state()
    }

    /// Volatility for one instrument from its persisted tick history.
    ///
    /// Returns None when there are not yet enough ticks to compute a
    /// return series.
    async fn volatility_for(&self, instrument_id: uuid::Uuid) -> Result<Option<f64>> {
        let ticks = self
            .store
            .price_history(instrument_id, self.volatility_window)
            .await?;

        // Store returns newest first; the indicator wants chronological order
        let prices: Vec<f64> = ticks.iter().rev().map(|t| t.price).collect();

        match calculate_volatility(&prices, self.volatility_window) {
            Ok(v) => Ok(Some(v)),
            Err(Error::InsufficientHistory) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn instruments_with_volatility(&self) -> Result<Vec<Instrument>> {
        let mut instruments = self.store.instruments().await?;
        for instrument in &mut instruments {
            instrument.volatility = self.volatility_for(instrument.id).await?;
        }
        Ok(instruments)
    }

    pub async fn current_snapshot(&self, instrument_id: uuid::Uuid) -> Result<InstrumentSnapshot> {
        let mut instrument = self.store.instrument(instrument_id).await?;
        instrument.volatility = self.volatility_for(instrument_id).await?;
        let history = self.scheduler.buffer().points(instrument_id);

        Ok(InstrumentSnapshot {
            instrument,
            history,
        })
    }

    /// What the agent's strategy would do right now, without executing.
    pub async fn recommendations(&self, agent_id: uuid::Uuid) -> Result<Vec<Recommendation>> {
        let agent = self.store.agent(agent_id).await?;
        let instruments = self.instruments_with_volatility().await?;
        Ok(recommend(&instruments, &agent))
    }

    pub async fn execute(&self, order: &Order) -> Result<TradeRecord> {
        self.ledger.execute(order).await
    }

    /// Run one strategy pass for an agent, executing every actionable
    /// recommendation. Orders rejected by the ledger (not enough cash,
    /// nothing held to sell) are logged and skipped rather than aborting
    /// the pass.
    pub async fn run_agent(&self, agent_id: uuid::Uuid) -> Result<Vec<TradeRecord>> {
        let agent = self.store.agent(agent_id).await?;
        let instruments = self.instruments_with_volatility().await?;
        let recommendations = recommend(&instruments, &agent);

        tracing::debug!(
            agent = %agent.name,
            count = recommendations.len(),
            "strategy pass produced recommendations"
        );

        let mut executed = Vec::new();
        for rec in recommendations {
            let order = Order {
                portfolio_id: agent.portfolio_id,
                instrument_id: rec.instrument_id,
                side: rec.side,
                quantity: rec.quantity,
                price: rec.price,
                agent_id: Some(agent.id),
                reason: rec.reason.clone(),
            };

            match self.ledger.execute(&order).await {
                Ok(trade) => executed.push(trade),
                Err(
                    e @ (Error::InsufficientFunds { .. }
                    | Error::InsufficientPosition { .. }
                    | Error::InvalidQuantity(_)),
                ) => {
                    tracing::info!(agent = %agent.name, symbol = %rec.symbol, "order skipped: {e}");
                }
                Err(e) => {
                    tracing::warn!(agent = %agent.name, symbol = %rec.symbol, "order failed: {e}");
                }
            }
        }

        Ok(executed)
    }
}
