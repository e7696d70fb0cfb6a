use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};

use crate::api::QuoteFeed;
use crate::db::Store;
use crate::feed::PriceHistoryBuffer;
use crate::models::Instrument;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum wait between successive per-instrument fetches in a cycle
    pub fetch_delay: Duration,
    /// Wait between full passes over all instruments
    pub cycle_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_delay: Duration::from_secs(12),
            cycle_interval: Duration::from_secs(60),
        }
    }
}

/// Polls the external feed for every tracked instrument on a fixed cadence.
///
/// A single background task is the only writer of instrument prices and
/// price history. Fetches are strictly sequential: one instrument at a
/// time with a rate-limit delay in between, never in parallel. Stopping
/// is cooperative and takes effect at the next instrument boundary,
/// never mid-fetch.
pub struct PriceFeedScheduler {
    feed: Arc<dyn QuoteFeed>,
    store: Arc<dyn Store>,
    buffer: PriceHistoryBuffer,
    config: SchedulerConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    state: RunState,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PriceFeedScheduler {
    pub fn new(
        feed: Arc<dyn QuoteFeed>,
        store: Arc<dyn Store>,
        buffer: PriceHistoryBuffer,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            feed,
            store,
            buffer,
            config,
            inner: Mutex::new(Inner {
                state: RunState::Stopped,
                shutdown: None,
                handle: None,
            }),
        }
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().unwrap().state
    }

    pub fn buffer(&self) -> &PriceHistoryBuffer {
        &self.buffer
    }

    /// Spawn the polling task. Idempotent: a second call while running
    /// is a no-op, not an error.
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == RunState::Running {
            tracing::debug!("scheduler already running, ignoring start");
            return;
        }

        let (tx, rx) = watch::channel(false);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run(rx).await;
        });

        inner.state = RunState::Running;
        inner.shutdown = Some(tx);
        inner.handle = Some(handle);
        tracing::info!("price feed scheduler started");
    }

    /// Signal shutdown and wait for the task to exit at the next
    /// instrument boundary. Safe to call at any time.
    pub async fn stop(&self) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == RunState::Stopped {
                tracing::debug!("scheduler already stopped, ignoring stop");
                return;
            }
            // Signal before releasing the lock: a start() racing in
            // right after must find the old task already told to exit
            if let Some(tx) = inner.shutdown.take() {
                let _ = tx.send(true);
            }
            inner.state = RunState::Stopped;
            inner.handle.take()
        };

        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("price feed scheduler stopped");
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now(), self.config.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            if !self.run_cycle(&mut shutdown).await {
                break;
            }
        }
    }

    /// One full pass over all tracked instruments, in symbol order.
    ///
    /// Returns false when shutdown was requested during the pass.
    /// Nothing in here is fatal: a failed fetch or persistence write is
    /// logged and the pass moves on to the next instrument.
    async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut instruments = match self.store.instruments().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("failed to load instruments, skipping cycle: {e}");
                return true;
            }
        };
        instruments.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        for (i, instrument) in instruments.iter().enumerate() {
            if *shutdown.borrow() {
                return false;
            }

            if i > 0 {
                tokio::select! {
                    _ = sleep(self.config.fetch_delay) => {}
                    _ = shutdown.changed() => return false,
                }
            }

            if let Err(e) = self.refresh_instrument(instrument).await {
                tracing::warn!(symbol = %instrument.symbol, "skipping instrument: {e}");
            }
        }

        true
    }

    async fn refresh_instrument(&self, instrument: &Instrument) -> Result<()> {
        let quote = self.feed.quote(&instrument.symbol).await?;

        // Redundant ticks carry no information; skip the whole update
        if quote.price == instrument.current_price {
            tracing::debug!(symbol = %instrument.symbol, "price unchanged, skipping");
            return Ok(());
        }

        // History first: the unchanged-price guard above keys off the
        // stored price, so writing the price before the history row
        // sticks means a failed history insert would never be retried.
        self.store
            .append_price_history(instrument.id, quote.price)
            .await?;
        self.buffer.append(instrument, quote.price);
        self.store
            .update_instrument_price(instrument.id, quote.price)
            .await?;

        tracing::info!(
            symbol = %instrument.symbol,
            price = quote.price,
            "updated quote"
        );
        Ok(())
    }
}
