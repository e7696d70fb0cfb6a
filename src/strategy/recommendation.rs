use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Instrument, RiskProfile, TradeSide, TradingAgent};

pub const BUY_THRESHOLD: f64 = 0.7;
pub const SELL_THRESHOLD: f64 = 0.3;

/// A suggested buy/sell action with sizing and rationale, not yet applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub instrument_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: i64,
    /// Price the sizing was computed against
    pub price: f64,
    pub score: f64,
    pub reason: String,
}

/// Score one instrument in [0, 1] for an agent's risk profile.
///
/// Volatility is clamped to [0, 1] first: a noisy feed can report returns
/// dispersion above 1, and an unclamped score would leave the range.
fn score_instrument(volatility: f64, profile: RiskProfile) -> f64 {
    let volatility = volatility.clamp(0.0, 1.0);
    match profile {
        // Conservative agents prefer low-volatility instruments
        RiskProfile::Conservative => 1.0 - volatility,
        // Aggressive agents prefer high-volatility instruments
        RiskProfile::Aggressive => volatility,
    }
}

/// Score every instrument for one agent and emit buy/sell recommendations.
///
/// Instruments without a defined volatility are skipped entirely, not
/// scored as neutral. Sizing caps each position at
/// `cash_allocated * max_position_fraction`. Sell recommendations are not
/// bounded by current holdings here; that check belongs to execution.
pub fn recommend(instruments: &[Instrument], agent: &TradingAgent) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for instrument in instruments {
        let Some(volatility) = instrument.volatility else {
            continue;
        };

        let score = score_instrument(volatility, agent.profile);
        let max_investment = agent.cash_allocated * agent.max_position_fraction;
        let quantity = (max_investment / instrument.current_price).floor() as i64;

        if score > BUY_THRESHOLD {
            recommendations.push(Recommendation {
                instrument_id: instrument.id,
                symbol: instrument.symbol.clone(),
                side: TradeSide::Buy,
                quantity,
                price: instrument.current_price,
                score,
                reason: format!(
                    "High score ({score:.2}) based on {} strategy",
                    agent.profile
                ),
            });
        } else if score < SELL_THRESHOLD {
            recommendations.push(Recommendation {
                instrument_id: instrument.id,
                symbol: instrument.symbol.clone(),
                side: TradeSide::Sell,
                quantity,
                price: instrument.current_price,
                score,
                reason: format!(
                    "Low score ({score:.2}) based on {} strategy",
                    agent.profile
                ),
            });
        }
        // Scores in [SELL_THRESHOLD, BUY_THRESHOLD] mean hold: no entry
    }

    recommendations
}
