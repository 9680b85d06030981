//! Read access to historical daily bars.
//!
//! The trainer only ever talks to [`BarStore`]; PostgreSQL is the production
//! backend, SQLite serves local runs, and the in-memory store backs tests.

pub mod postgres;
pub mod sqlite;

pub use postgres::PgBarStore;
pub use sqlite::SqliteBarStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::TrainingConfig;
use crate::error::Result;
use crate::types::{Bar, BarSeries};

/// Row count and newest timestamp of one asset's history
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSummary {
    pub symbol: String,
    pub bars: usize,
    pub latest: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BarStore: Send + Sync {
    /// Active asset identifiers, sorted
    async fn list_assets(&self) -> Result<Vec<String>>;

    /// Full history of one asset; empty when the symbol has no rows
    async fn load_bars(&self, symbol: &str) -> Result<BarSeries>;

    async fn summarize(&self, symbol: &str) -> Result<AssetSummary> {
        let series = self.load_bars(symbol).await?;
        Ok(AssetSummary {
            symbol: symbol.to_string(),
            bars: series.len(),
            latest: series.last().map(|b| b.timestamp),
        })
    }
}

/// Open the configured backend: SQLite when `sqlite_path` is set, else PostgreSQL
pub async fn open_store(config: &TrainingConfig) -> Result<Arc<dyn BarStore>> {
    match &config.sqlite_path {
        Some(path) => Ok(Arc::new(SqliteBarStore::new(path).await?)),
        None => {
            let pool_size = (config.job_count as u32).max(1);
            Ok(Arc::new(PgBarStore::connect(&config.database_url(), pool_size).await?))
        }
    }
}

/// Bars held in memory, keyed by symbol
#[derive(Default)]
pub struct MemoryBarStore {
    series: RwLock<BTreeMap<String, Vec<Bar>>>,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, series: BarSeries) {
        let symbol = series.symbol().to_string();
        info!("Memory store: {} bars for {}", series.len(), symbol);
        self.series
            .write()
            .await
            .insert(symbol, series.bars().to_vec());
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn list_assets(&self) -> Result<Vec<String>> {
        Ok(self.series.read().await.keys().cloned().collect())
    }

    async fn load_bars(&self, symbol: &str) -> Result<BarSeries> {
        let bars = self
            .series
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        Ok(BarSeries::new(symbol, bars))
    }
}
