use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::api::{Quote, QuoteFeed};
use crate::Result;

/// Random-walk quote generator for demo mode
///
/// Stands in for the external feed when no API key is configured, so the
/// paper-trading demo runs end to end offline. Each symbol starts at a
/// random price and drifts ±0.5% per quote.
pub struct SimulatedFeed {
    state: Mutex<SimState>,
}

struct SimState {
    rng: StdRng,
    last_prices: HashMap<String, f64>,
}

impl SimulatedFeed {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                last_prices: HashMap::new(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl QuoteFeed for SimulatedFeed {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let mut state = self.state.lock().unwrap();
        let SimState { rng, last_prices } = &mut *state;

        let previous = last_prices.get(symbol).copied();
        let price = match previous {
            Some(last) => last * (1.0 + rng.gen_range(-0.005..0.005)),
            None => rng.gen_range(20.0..250.0),
        };
        last_prices.insert(symbol.to_string(), price);

        let change_percent = previous
            .map(|last| (price - last) / last * 100.0)
            .unwrap_or(0.0);

        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            change_percent,
            volume: rng.gen_range(100_000..10_000_000),
            as_of: Utc::now().format("%Y-%m-%d").to_string(),
        })
    }
}
