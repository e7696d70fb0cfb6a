use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tradable symbol with a current price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub id: Uuid,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    /// Derived from recent price history; None until enough points exist
    pub volatility: Option<f64>,
}

/// One OHLC sample per update tick (not a calendar bar)
///
/// Open/high/low are derived from the previous close and the new price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PricePoint {
    /// Build the OHLC point for a new tick from the previous close
    pub fn from_tick(previous_close: f64, new_price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            open: previous_close,
            high: previous_close.max(new_price),
            low: previous_close.min(new_price),
            close: new_price,
        }
    }
}

/// Cash-constrained ledger owned by one user or by a trading agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub owner: String,
    /// Invariant: never negative
    pub cash_balance: f64,
}

/// Holding of one instrument inside one portfolio
///
/// A position with quantity 0 is equivalent to absence and may be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub portfolio_id: Uuid,
    pub instrument_id: Uuid,
    pub quantity: i64,
    /// Weighted average acquisition price across buys; unchanged by sells
    pub avg_price: f64,
}

/// Risk profile driving the recommendation engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    Aggressive,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskProfile {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(RiskProfile::Conservative),
            "aggressive" => Ok(RiskProfile::Aggressive),
            other => Err(crate::Error::Persistence(format!(
                "unknown risk profile: {other}"
            ))),
        }
    }
}

/// Configured risk profile used to parameterize scoring and sizing.
///
/// Agents hold no state beyond configuration; their money lives in the
/// portfolio they reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAgent {
    pub id: Uuid,
    pub name: String,
    pub profile: RiskProfile,
    pub portfolio_id: Uuid,
    pub cash_allocated: f64,
    pub risk_score: f64,
    /// Maximum fraction of allocated cash per single position
    pub max_position_fraction: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// An order to be applied against a portfolio, not yet executed
#[derive(Debug, Clone)]
pub struct Order {
    pub portfolio_id: Uuid,
    pub instrument_id: Uuid,
    pub side: TradeSide,
    pub quantity: i64,
    pub price: f64,
    /// Set when the order came from an automated agent
    pub agent_id: Option<Uuid>,
    pub reason: String,
}

/// Immutable audit entry, appended once per successful execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    pub portfolio_id: Uuid,
    pub instrument_id: Uuid,
    pub side: TradeSide,
    pub quantity: i64,
    pub price: f64,
    pub reason: String,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_point_from_tick_up() {
        let now = Utc::now();
        let point = PricePoint::from_tick(100.0, 104.0, now);

        assert_eq!(point.open, 100.0);
        assert_eq!(point.high, 104.0);
        assert_eq!(point.low, 100.0);
        assert_eq!(point.close, 104.0);
    }

    #[test]
    fn test_price_point_from_tick_down() {
        let now = Utc::now();
        let point = PricePoint::from_tick(100.0, 97.5, now);

        assert_eq!(point.open, 100.0);
        assert_eq!(point.high, 100.0);
        assert_eq!(point.low, 97.5);
        assert_eq!(point.close, 97.5);
    }

    #[test]
    fn test_risk_profile_round_trip() {
        assert_eq!(
            "conservative".parse::<RiskProfile>().unwrap(),
            RiskProfile::Conservative
        );
        assert_eq!(
            "aggressive".parse::<RiskProfile>().unwrap(),
            RiskProfile::Aggressive
        );
        assert!("quantum".parse::<RiskProfile>().is_err());
        assert_eq!(RiskProfile::Conservative.to_string(), "conservative");
    }
}
