use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use super::BarStore;
use crate::error::Result;
use crate::types::{Bar, BarSeries};

/// Local SQLite mirror of the market schema; dates are stored as RFC 3339 text
pub struct SqliteBarStore {
    pool: SqlitePool,
}

impl SqliteBarStore {
    pub async fn new(db_path: &str) -> Result<Self> {
        info!("Opening SQLite bar store at: {}", db_path);

        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        // every connection to an in-memory database is a separate database
        let max_connections = if db_path.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stocks (
                symbol TEXT PRIMARY KEY,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_prices (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_asset(&self, symbol: &str, is_active: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stocks (symbol, is_active) VALUES (?, ?)
            ON CONFLICT(symbol) DO UPDATE SET is_active = excluded.is_active
            "#,
        )
        .bind(symbol)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace bars and mark the asset active
    pub async fn insert_bars(&self, series: &BarSeries) -> Result<u64> {
        self.upsert_asset(series.symbol(), true).await?;

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for bar in series.bars() {
            written += sqlx::query(
                r#"
                INSERT OR REPLACE INTO daily_prices (symbol, date, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(series.symbol())
            .bind(bar.timestamp.to_rfc3339())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl BarStore for SqliteBarStore {
    async fn list_assets(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT symbol FROM stocks WHERE is_active = 1 ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }

    async fn load_bars(&self, symbol: &str) -> Result<BarSeries> {
        let rows = sqlx::query(
            r#"
            SELECT date, open, high, low, close, volume
            FROM daily_prices
            WHERE symbol = ?
            ORDER BY date ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let date: String = row.try_get("date")?;
            let timestamp = DateTime::parse_from_rfc3339(&date)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                .with_timezone(&Utc);
            bars.push(Bar {
                timestamp,
                open: row.try_get("open")?,
                high: row.try_get("high")?,
                low: row.try_get("low")?,
                close: row.try_get("close")?,
                volume: row.try_get("volume")?,
            });
        }
        Ok(BarSeries::new(symbol, bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{day, linear_series};

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = SqliteBarStore::new("sqlite::memory:").await.unwrap();
        let series = linear_series("aapl", 30, 100.0, 1.0);
        assert_eq!(store.insert_bars(&series).await.unwrap(), 30);

        let loaded = store.load_bars("aapl").await.unwrap();
        assert_eq!(loaded.len(), 30);
        assert_eq!(loaded.bars()[0].timestamp, day(0));
        assert_eq!(loaded.closes(), series.closes());
    }

    #[tokio::test]
    async fn test_inactive_assets_are_hidden() {
        let store = SqliteBarStore::new("sqlite::memory:").await.unwrap();
        store.insert_bars(&linear_series("msft", 5, 10.0, 1.0)).await.unwrap();
        store.insert_bars(&linear_series("aapl", 5, 10.0, 1.0)).await.unwrap();
        store.upsert_asset("msft", false).await.unwrap();

        assert_eq!(store.list_assets().await.unwrap(), vec!["aapl"]);
        let summary = store.summarize("aapl").await.unwrap();
        assert_eq!(summary.bars, 5);
        assert_eq!(summary.latest, Some(day(4)));
    }

    #[tokio::test]
    async fn test_reinsert_replaces_rows() {
        let store = SqliteBarStore::new("sqlite::memory:").await.unwrap();
        store.insert_bars(&linear_series("aapl", 5, 10.0, 1.0)).await.unwrap();
        store.insert_bars(&linear_series("aapl", 5, 20.0, 1.0)).await.unwrap();
        let loaded = store.load_bars("aapl").await.unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.bars()[0].close, 20.0);
    }
}
