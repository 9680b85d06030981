use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use super::{AssetSummary, BarStore};
use crate::error::Result;
use crate::types::{Bar, BarSeries};

/// `market.stocks` / `market.daily_prices` in PostgreSQL
pub struct PgBarStore {
    pool: PgPool,
}

impl PgBarStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        info!("Connected to PostgreSQL ({} connections)", max_connections);
        Ok(Self { pool })
    }
}

#[async_trait]
impl BarStore for PgBarStore {
    async fn list_assets(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol
            FROM market.stocks
            WHERE is_active = true
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }

    async fn load_bars(&self, symbol: &str) -> Result<BarSeries> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(date AS TIMESTAMP) AS ts,
                   CAST(open AS DOUBLE PRECISION) AS open,
                   CAST(high AS DOUBLE PRECISION) AS high,
                   CAST(low AS DOUBLE PRECISION) AS low,
                   CAST(close AS DOUBLE PRECISION) AS close,
                   CAST(volume AS DOUBLE PRECISION) AS volume
            FROM market.daily_prices
            WHERE symbol = $1
            ORDER BY date ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let ts: NaiveDateTime = row.try_get("ts")?;
            bars.push(Bar {
                timestamp: ts.and_utc(),
                open: row.try_get("open")?,
                high: row.try_get("high")?,
                low: row.try_get("low")?,
                close: row.try_get("close")?,
                volume: row.try_get("volume")?,
            });
        }

        debug!("Loaded {} bars for {}", bars.len(), symbol);
        Ok(BarSeries::new(symbol, bars))
    }

    async fn summarize(&self, symbol: &str) -> Result<AssetSummary> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS bars, MAX(CAST(date AS TIMESTAMP)) AS latest
            FROM market.daily_prices
            WHERE symbol = $1
            "#,
        )
        .bind(symbol)
        .fetch_one(&self.pool)
        .await?;

        let bars: i64 = row.try_get("bars")?;
        let latest: Option<NaiveDateTime> = row.try_get("latest")?;
        Ok(AssetSummary {
            symbol: symbol.to_string(),
            bars: bars.max(0) as usize,
            latest: latest.map(|ts| ts.and_utc()),
        })
    }
}
