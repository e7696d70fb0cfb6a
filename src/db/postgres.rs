use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::db::{PriceTick, Store};
use crate::feed::DEFAULT_CAPACITY;
use crate::models::{
    Instrument, Portfolio, Position, RiskProfile, TradeRecord, TradeSide, TradingAgent,
};
use crate::{Error, Result};

/// Postgres-backed store
///
/// Money columns are NUMERIC and cross the boundary as
/// `rust_decimal::Decimal`; models stay f64.
pub struct PostgresStore {
    pool: PgPool,
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_string()
        .parse()
        .map_err(|e| Error::Persistence(format!("bad numeric value: {e}")))
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64_retain(value)
        .ok_or_else(|| Error::Persistence(format!("non-finite numeric value: {value}")))
}

impl PostgresStore {
    /// Connect to Postgres and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        tracing::info!("connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    fn instrument_from_row(row: &sqlx::postgres::PgRow) -> Result<Instrument> {
        Ok(Instrument {
            id: row.get("id"),
            symbol: row.get("symbol"),
            name: row.get("name"),
            current_price: to_f64(row.get("current_price"))?,
            // Derived at read time from history, never persisted
            volatility: None,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn instruments(&self) -> Result<Vec<Instrument>> {
        let rows = sqlx::query(
            "SELECT id, symbol, name, current_price FROM instruments ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::instrument_from_row).collect()
    }

    async fn instrument(&self, id: Uuid) -> Result<Instrument> {
        let row = sqlx::query("SELECT id, symbol, name, current_price FROM instruments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instrument {id}")))?;

        Self::instrument_from_row(&row)
    }

    async fn update_instrument_price(&self, id: Uuid, price: f64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE instruments SET current_price = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(to_decimal(price)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("instrument {id}")));
        }
        Ok(())
    }

    async fn append_price_history(&self, instrument_id: Uuid, price: f64) -> Result<()> {
        sqlx::query("INSERT INTO price_history (instrument_id, price) VALUES ($1, $2)")
            .bind(instrument_id)
            .bind(to_decimal(price)?)
            .execute(&self.pool)
            .await?;

        // Sliding window, not a permanent log: drop anything past the cap
        sqlx::query(
            r#"
            DELETE FROM price_history
            WHERE instrument_id = $1
              AND id NOT IN (
                SELECT id FROM price_history
                WHERE instrument_id = $1
                ORDER BY recorded_at DESC, id DESC
                LIMIT $2
              )
            "#,
        )
        .bind(instrument_id)
        .bind(DEFAULT_CAPACITY as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn price_history(&self, instrument_id: Uuid, limit: usize) -> Result<Vec<PriceTick>> {
        let rows = sqlx::query(
            r#"
            SELECT price, recorded_at FROM price_history
            WHERE instrument_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(instrument_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let recorded_at: DateTime<Utc> = row.get("recorded_at");
                Ok(PriceTick {
                    price: to_f64(row.get("price"))?,
                    recorded_at,
                })
            })
            .collect()
    }

    async fn portfolio(&self, id: Uuid) -> Result<Portfolio> {
        let row = sqlx::query("SELECT id, owner, cash_balance FROM portfolios WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("portfolio {id}")))?;

        Ok(Portfolio {
            id: row.get("id"),
            owner: row.get("owner"),
            cash_balance: to_f64(row.get("cash_balance"))?,
        })
    }

    async fn position(
        &self,
        portfolio_id: Uuid,
        instrument_id: Uuid,
    ) -> Result<Option<Position>> {
        let row = sqlx::query(
            r#"
            SELECT quantity, avg_price FROM positions
            WHERE portfolio_id = $1 AND instrument_id = $2
            "#,
        )
        .bind(portfolio_id)
        .bind(instrument_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Position {
                portfolio_id,
                instrument_id,
                quantity: row.get("quantity"),
                avg_price: to_f64(row.get("avg_price"))?,
            })
        })
        .transpose()
    }

    async fn positions(&self, portfolio_id: Uuid) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, quantity, avg_price FROM positions
            WHERE portfolio_id = $1
            "#,
        )
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Position {
                    portfolio_id,
                    instrument_id: row.get("instrument_id"),
                    quantity: row.get("quantity"),
                    avg_price: to_f64(row.get("avg_price"))?,
                })
            })
            .collect()
    }

    async fn agents(&self) -> Result<Vec<TradingAgent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, profile, portfolio_id, cash_allocated,
                   risk_score, max_position_fraction
            FROM agents ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let profile: String = row.get("profile");
                Ok(TradingAgent {
                    id: row.get("id"),
                    name: row.get("name"),
                    profile: profile.parse::<RiskProfile>()?,
                    portfolio_id: row.get("portfolio_id"),
                    cash_allocated: to_f64(row.get("cash_allocated"))?,
                    risk_score: row.get("risk_score"),
                    max_position_fraction: row.get("max_position_fraction"),
                })
            })
            .collect()
    }

    async fn agent(&self, id: Uuid) -> Result<TradingAgent> {
        let row = sqlx::query(
            r#"
            SELECT id, name, profile, portfolio_id, cash_allocated,
                   risk_score, max_position_fraction
            FROM agents WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("agent {id}")))?;

        let profile: String = row.get("profile");
        Ok(TradingAgent {
            id: row.get("id"),
            name: row.get("name"),
            profile: profile.parse::<RiskProfile>()?,
            portfolio_id: row.get("portfolio_id"),
            cash_allocated: to_f64(row.get("cash_allocated"))?,
            risk_score: row.get("risk_score"),
            max_position_fraction: row.get("max_position_fraction"),
        })
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
        let cost = to_decimal(quantity as f64 * price)?;

        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent buys/sells on the same portfolio
        let row = sqlx::query("SELECT cash_balance FROM portfolios WHERE id = $1 FOR UPDATE")
            .bind(portfolio_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("portfolio {portfolio_id}")))?;

        let cash = to_f64(row.get("cash_balance"))?;
        if quantity as f64 * price > cash {
            // Dropping the transaction rolls it back
            return Err(Error::InsufficientFunds {
                required: quantity as f64 * price,
                available: cash,
            });
        }

        sqlx::query(
            "UPDATE portfolios SET cash_balance = cash_balance - $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(portfolio_id)
        .bind(cost)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO positions (portfolio_id, instrument_id, quantity, avg_price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (portfolio_id, instrument_id) DO UPDATE SET
                avg_price = (positions.avg_price * positions.quantity
                             + EXCLUDED.avg_price * EXCLUDED.quantity)
                            / (positions.quantity + EXCLUDED.quantity),
                quantity = positions.quantity + EXCLUDED.quantity,
                updated_at = NOW()
            "#,
        )
        .bind(portfolio_id)
        .bind(instrument_id)
        .bind(quantity)
        .bind(to_decimal(price)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
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
        let proceeds = to_decimal(quantity as f64 * price)?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT quantity FROM positions
            WHERE portfolio_id = $1 AND instrument_id = $2
            FOR UPDATE
            "#,
        )
        .bind(portfolio_id)
        .bind(instrument_id)
        .fetch_optional(&mut *tx)
        .await?;

        let held: i64 = row.map(|r| r.get("quantity")).unwrap_or(0);
        if held < quantity {
            return Err(Error::InsufficientPosition {
                held,
                requested: quantity,
            });
        }

        let result = sqlx::query(
            "UPDATE portfolios SET cash_balance = cash_balance + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(portfolio_id)
        .bind(proceeds)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("portfolio {portfolio_id}")));
        }

        // Average price is unchanged by a sell; zero positions are removed
        sqlx::query(
            r#"
            UPDATE positions SET quantity = quantity - $3, updated_at = NOW()
            WHERE portfolio_id = $1 AND instrument_id = $2
            "#,
        )
        .bind(portfolio_id)
        .bind(instrument_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM positions WHERE portfolio_id = $1 AND instrument_id = $2 AND quantity <= 0",
        )
        .bind(portfolio_id)
        .bind(instrument_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, agent_id, portfolio_id, instrument_id, side,
                quantity, price, reason, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trade.id)
        .bind(trade.agent_id)
        .bind(trade.portfolio_id)
        .bind(trade.instrument_id)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(to_decimal(trade.price)?)
        .bind(&trade.reason)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn trades(&self, portfolio_id: Uuid) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, agent_id, instrument_id, side, quantity, price, reason, executed_at
            FROM trades
            WHERE portfolio_id = $1
            ORDER BY executed_at ASC
            "#,
        )
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let side: String = row.get("side");
                let side = match side.as_str() {
                    "buy" => TradeSide::Buy,
                    "sell" => TradeSide::Sell,
                    other => {
                        return Err(Error::Persistence(format!("unknown trade side: {other}")))
                    }
                };
                Ok(TradeRecord {
                    id: row.get("id"),
                    agent_id: row.get("agent_id"),
                    portfolio_id,
                    instrument_id: row.get("instrument_id"),
                    side,
                    quantity: row.get("quantity"),
                    price: to_f64(row.get("price"))?,
                    reason: row.get("reason"),
                    executed_at: row.get("executed_at"),
                })
            })
            .collect()
    }
}
