use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Duration;

use papertrader::api::{Quote, QuoteFeed};
use papertrader::db::{MemoryStore, Store};
use papertrader::feed::{RunState, SchedulerConfig};
use papertrader::models::{RiskProfile, TradeSide};
use papertrader::{Error, Result, TradingService};

/// Feed that replays a fixed tape per symbol, holding the last price
/// once the tape runs out.
struct TapeFeed {
    tapes: HashMap<String, Vec<f64>>,
    cursors: Mutex<HashMap<String, usize>>,
}

impl TapeFeed {
    fn new(tapes: &[(&str, &[f64])]) -> Self {
        Self {
            tapes: tapes
                .iter()
                .map(|(symbol, prices)| (symbol.to_string(), prices.to_vec()))
                .collect(),
            cursors: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl QuoteFeed for TapeFeed {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let tape = self
            .tapes
            .get(symbol)
            .ok_or_else(|| Error::FeedUnavailable(format!("no tape for {symbol}")))?;

        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.entry(symbol.to_string()).or_insert(0);
        let price = tape[(*cursor).min(tape.len() - 1)];
        *cursor += 1;

        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            change_percent: 0.0,
            volume: 1_000,
            as_of: Utc::now().format("%Y-%m-%d").to_string(),
        })
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        fetch_delay: Duration::from_millis(1),
        cycle_interval: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn scheduler_updates_prices_and_history_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let moving = store.add_instrument("AAPL", "Apple Inc.", 100.0);
    let flat = store.add_instrument("MSFT", "Microsoft", 50.0);

    let feed = Arc::new(TapeFeed::new(&[
        ("AAPL", &[101.0, 102.0, 103.0, 104.0][..]),
        ("MSFT", &[50.0][..]),
    ]));

    let service = TradingService::new(Arc::clone(&store) as Arc<dyn Store>, feed, fast_config());

    service.start_scheduler();
    assert_eq!(service.scheduler_state(), RunState::Running);

    tokio::time::sleep(Duration::from_millis(150)).await;
    service.stop_scheduler().await;
    assert_eq!(service.scheduler_state(), RunState::Stopped);

    // Moving instrument picked up the tape
    let refreshed = store.instrument(moving.id).await.unwrap();
    assert!(refreshed.current_price > 100.0);

    let ticks = store.price_history(moving.id, 100).await.unwrap();
    assert!(!ticks.is_empty());
    // Newest first
    assert_eq!(ticks[0].price, refreshed.current_price);

    // Flat tape matches the seeded price, so nothing is recorded
    let refreshed = store.instrument(flat.id).await.unwrap();
    assert_eq!(refreshed.current_price, 50.0);
    let ticks = store.price_history(flat.id, 100).await.unwrap();
    assert!(ticks.is_empty());
}

#[tokio::test]
async fn scheduler_builds_candles_in_memory() {
    let store = Arc::new(MemoryStore::new());
    let instrument = store.add_instrument("AAPL", "Apple Inc.", 100.0);

    let feed = Arc::new(TapeFeed::new(&[("AAPL", &[101.0, 99.0, 103.0][..])]));
    let service = TradingService::new(Arc::clone(&store) as Arc<dyn Store>, feed, fast_config());

    service.start_scheduler();
    tokio::time::sleep(Duration::from_millis(150)).await;
    service.stop_scheduler().await;

    let snapshot = service.current_snapshot(instrument.id).await.unwrap();
    assert!(snapshot.history.len() >= 2);

    // Each candle opens at the previous close
    let first = &snapshot.history[0];
    assert_eq!(first.open, 100.0);
    assert_eq!(first.close, 101.0);
    for pair in snapshot.history.windows(2) {
        assert_eq!(pair[1].open, pair[0].close);
        assert!(pair[1].high >= pair[1].low);
    }
}

#[tokio::test]
async fn full_agent_flow_buys_on_calm_tape_and_records_the_trade() {
    let store = Arc::new(MemoryStore::new());
    let instrument = store.add_instrument("AAPL", "Apple Inc.", 100.0);
    let portfolio = store.add_portfolio("conservative desk", 10_000.0);
    let agent = store.add_agent(
        "steady",
        RiskProfile::Conservative,
        portfolio.id,
        10_000.0,
        0.1,
    );

    // Calm tape: tiny moves keep volatility near zero, conservative
    // score near one.
    for price in [100.0, 100.1, 100.0, 100.1, 100.0] {
        store
            .append_price_history(instrument.id, price)
            .await
            .unwrap();
    }

    let feed = Arc::new(TapeFeed::new(&[("AAPL", &[100.0][..])]));
    let service = TradingService::new(Arc::clone(&store) as Arc<dyn Store>, feed, fast_config());

    let trades = service.run_agent(agent.id).await.unwrap();
    assert_eq!(trades.len(), 1);

    let trade = &trades[0];
    assert_eq!(trade.side, TradeSide::Buy);
    assert_eq!(trade.agent_id, Some(agent.id));
    assert_eq!(trade.instrument_id, instrument.id);
    // floor(10000 * 0.1 / 100)
    assert_eq!(trade.quantity, 10);
    assert!(trade.reason.starts_with("High score"));

    // Books reflect the fill
    let portfolio_after = store.portfolio(portfolio.id).await.unwrap();
    let expected_cash = 10_000.0 - 10.0 * trade.price;
    assert!((portfolio_after.cash_balance - expected_cash).abs() < 1e-9);

    let position = store
        .position(portfolio.id, instrument.id)
        .await
        .unwrap()
        .expect("position opened");
    assert_eq!(position.quantity, 10);

    // And the trade is on the record
    let recorded = store.trades(portfolio.id).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].id, trade.id);
}

#[tokio::test]
async fn aggressive_agent_sells_down_a_position_on_a_calm_tape() {
    let store = Arc::new(MemoryStore::new());
    let instrument = store.add_instrument("TSLA", "Tesla Inc.", 200.0);
    let portfolio = store.add_portfolio("aggressive desk", 10_000.0);
    let agent = store.add_agent(
        "high-roller",
        RiskProfile::Aggressive,
        portfolio.id,
        10_000.0,
        0.2,
    );

    // Hold 15 shares going in
    store
        .buy_instrument(portfolio.id, instrument.id, 15, 200.0)
        .await
        .unwrap();

    // Flat tape: volatility 0, aggressive score 0, sell signal
    for _ in 0..5 {
        store
            .append_price_history(instrument.id, 200.0)
            .await
            .unwrap();
    }

    let feed = Arc::new(TapeFeed::new(&[("TSLA", &[200.0][..])]));
    let service = TradingService::new(Arc::clone(&store) as Arc<dyn Store>, feed, fast_config());

    let trades = service.run_agent(agent.id).await.unwrap();

    // Sized at floor(10000 * 0.2 / 200) = 10, within the 15 held
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].side, TradeSide::Sell);
    assert_eq!(trades[0].quantity, 10);
    assert!(trades[0].reason.starts_with("Low score"));

    let position = store
        .position(portfolio.id, instrument.id)
        .await
        .unwrap()
        .expect("position remains");
    assert_eq!(position.quantity, 5);
}
