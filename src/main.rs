use papertrader::api::{AlphaVantageClient, QuoteFeed, SimulatedFeed};
use papertrader::db::{MemoryStore, PostgresStore, Store};
use papertrader::feed::SchedulerConfig;
use papertrader::models::RiskProfile;
use papertrader::TradingService;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};

const DEFAULT_AGENT_INTERVAL_SECS: u64 = 300;

const DEMO_INSTRUMENTS: &[(&str, &str, f64)] = &[
    ("AAPL", "Apple Inc.", 178.50),
    ("MSFT", "Microsoft Corporation", 412.30),
    ("GOOGL", "Alphabet Inc.", 141.80),
    ("AMZN", "Amazon.com Inc.", 185.20),
    ("TSLA", "Tesla Inc.", 248.90),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("📈 Paper trader starting");

    let store = build_store().await;
    let feed = build_feed();
    let config = scheduler_config_from_env();

    let service = Arc::new(TradingService::new(
        Arc::clone(&store),
        feed,
        config.clone(),
    ));

    let agents = store.agents().await?;
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Fetch delay: {:?}", config.fetch_delay);
    tracing::info!("  Cycle interval: {:?}", config.cycle_interval);
    tracing::info!("  Agents: {}", agents.len());
    for agent in &agents {
        tracing::info!(
            "    - {} ({}, ${:.2} allocated)",
            agent.name,
            agent.profile,
            agent.cash_allocated
        );
    }

    service.start_scheduler();
    tracing::info!("✅ Price feed scheduler running");

    let agent_task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            agent_loop(service).await;
        })
    };

    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = agent_task => {
            tracing::error!("Agent loop exited: {:?}", result);
        }
    }

    service.stop_scheduler().await;
    tracing::info!("👋 Paper trader stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papertrader=info".into()),
        )
        .init();
}

/// Postgres when DATABASE_URL is set and reachable, otherwise a seeded
/// in-memory store so the binary runs out of the box.
async fn build_store() -> Arc<dyn Store> {
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        match PostgresStore::connect(&database_url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Postgres ({}), falling back to in-memory store",
                    e
                );
            }
        }
    }

    tracing::info!("Using in-memory store with demo data");
    Arc::new(seeded_memory_store())
}

fn seeded_memory_store() -> MemoryStore {
    let store = MemoryStore::new();

    for (symbol, name, price) in DEMO_INSTRUMENTS {
        store.add_instrument(symbol, name, *price);
    }

    let conservative_book = store.add_portfolio("conservative desk", 10_000.0);
    store.add_agent(
        "steady-eddie",
        RiskProfile::Conservative,
        conservative_book.id,
        10_000.0,
        0.1,
    );

    let aggressive_book = store.add_portfolio("aggressive desk", 10_000.0);
    store.add_agent(
        "high-roller",
        RiskProfile::Aggressive,
        aggressive_book.id,
        10_000.0,
        0.1,
    );

    store
}

/// Alpha Vantage when a key is configured, otherwise a seeded random walk.
fn build_feed() -> Arc<dyn QuoteFeed> {
    match std::env::var("ALPHAVANTAGE_API_KEY") {
        Ok(api_key) if !api_key.is_empty() => {
            tracing::info!("Using Alpha Vantage quote feed");
            Arc::new(AlphaVantageClient::new(api_key))
        }
        _ => {
            tracing::info!("No ALPHAVANTAGE_API_KEY set, using simulated quote feed");
            Arc::new(SimulatedFeed::new(rand::random()))
        }
    }
}

fn scheduler_config_from_env() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    if let Some(secs) = env_u64("FETCH_DELAY_SECS") {
        config.fetch_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = env_u64("CYCLE_INTERVAL_SECS") {
        config.cycle_interval = Duration::from_secs(secs);
    }
    config
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Strategy loop: run every agent on an interval and log the books.
async fn agent_loop(service: Arc<TradingService>) {
    let interval_secs = env_u64("AGENT_INTERVAL_SECS").unwrap_or(DEFAULT_AGENT_INTERVAL_SECS);

    let mut ticker = interval_at(
        Instant::now() + Duration::from_secs(interval_secs),
        Duration::from_secs(interval_secs),
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("💹 Agent loop starting (every {}s)", interval_secs);

    loop {
        ticker.tick().await;

        let agents = match service.store().agents().await {
            Ok(agents) => agents,
            Err(e) => {
                tracing::error!("Failed to load agents: {}", e);
                continue;
            }
        };

        for agent in &agents {
            match service.run_agent(agent.id).await {
                Ok(trades) => {
                    for trade in &trades {
                        tracing::info!(
                            "  ✓ {} {} {} x{} @ ${:.2}",
                            agent.name,
                            trade.side.as_str(),
                            trade.instrument_id,
                            trade.quantity,
                            trade.price
                        );
                    }
                    if trades.is_empty() {
                        tracing::info!("  {} - no actionable signals", agent.name);
                    }
                }
                Err(e) => {
                    tracing::error!("  ✗ Agent {} pass failed: {}", agent.name, e);
                }
            }

            log_portfolio_summary(&service, agent.portfolio_id).await;
        }
    }
}

async fn log_portfolio_summary(service: &Arc<TradingService>, portfolio_id: uuid::Uuid) {
    let store = service.store();

    let portfolio = match store.portfolio(portfolio_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Failed to load portfolio {}: {}", portfolio_id, e);
            return;
        }
    };
    let positions = match store.positions(portfolio_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Failed to load positions for {}: {}", portfolio_id, e);
            return;
        }
    };

    tracing::info!("\n📊 {} summary:", portfolio.owner);
    tracing::info!("  Cash: ${:.2}", portfolio.cash_balance);
    tracing::info!("  Open positions: {}", positions.len());

    for position in positions {
        let line = match store.instrument(position.instrument_id).await {
            Ok(instrument) => {
                let unrealized =
                    (instrument.current_price - position.avg_price) * position.quantity as f64;
                format!(
                    "    {} x{} | Entry: ${:.2} | Current: ${:.2} | P&L: ${:.2}",
                    instrument.symbol,
                    position.quantity,
                    position.avg_price,
                    instrument.current_price,
                    unrealized
                )
            }
            Err(_) => format!(
                "    {} x{} | Entry: ${:.2}",
                position.instrument_id, position.quantity, position.avg_price
            ),
        };
        tracing::info!("{}", line);
    }
}
