use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::database::{AssetSummary, BarStore};
use crate::error::Result;
use crate::ml::dataset::training_universe;

/// Outcome of the pre-training data checks
#[derive(Debug, Clone, Serialize)]
pub struct FreshnessReport {
    pub active_assets: usize,
    /// Assets with at least the required history
    pub usable_assets: usize,
    pub newest_bar: Option<DateTime<Utc>>,
    pub stale_assets: Vec<String>,
    pub short_assets: Vec<String>,
    pub problems: Vec<String>,
}

impl FreshnessReport {
    pub fn is_fresh(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check asset count, data age and history length before training
pub async fn check_freshness(
    store: &dyn BarStore,
    config: &TrainingConfig,
    now: DateTime<Utc>,
) -> Result<FreshnessReport> {
    let policy = &config.freshness;
    let universe = training_universe(&store.list_assets().await?, config);

    let mut summaries: Vec<AssetSummary> = Vec::with_capacity(universe.len());
    for symbol in &universe {
        summaries.push(store.summarize(symbol).await?);
    }

    let max_age = Duration::days(policy.max_age_days);
    let newest_bar = summaries.iter().filter_map(|s| s.latest).max();
    let stale_assets: Vec<String> = summaries
        .iter()
        .filter(|s| s.latest.map_or(true, |ts| now - ts > max_age))
        .map(|s| s.symbol.clone())
        .collect();
    let short_assets: Vec<String> = summaries
        .iter()
        .filter(|s| s.bars < policy.min_bars)
        .map(|s| s.symbol.clone())
        .collect();
    let usable_assets = summaries.len() - short_assets.len();

    let mut problems = Vec::new();
    if universe.len() < policy.min_assets {
        problems.push(format!(
            "only {} active assets, need {}",
            universe.len(),
            policy.min_assets
        ));
    }
    match newest_bar {
        Some(ts) if now - ts > max_age => problems.push(format!(
            "newest bar is {} days old (limit {})",
            (now - ts).num_days(),
            policy.max_age_days
        )),
        None => problems.push("no price data".to_string()),
        _ => {}
    }
    if usable_assets < policy.min_assets {
        problems.push(format!(
            "only {} assets have {} or more bars, need {}",
            usable_assets, policy.min_bars, policy.min_assets
        ));
    }

    if !stale_assets.is_empty() {
        warn!("{} assets have stale data: {:?}", stale_assets.len(), stale_assets);
    }
    if !short_assets.is_empty() {
        warn!("{} assets have short history: {:?}", short_assets.len(), short_assets);
    }

    let report = FreshnessReport {
        active_assets: universe.len(),
        usable_assets,
        newest_bar,
        stale_assets,
        short_assets,
        problems,
    };
    if report.is_fresh() {
        info!(
            "Data check passed: {} assets, {} usable, newest bar {:?}",
            report.active_assets, report.usable_assets, report.newest_bar
        );
    } else {
        for problem in &report.problems {
            warn!("Data check failed: {}", problem);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryBarStore;
    use crate::types::fixtures::{day, linear_series};

    async fn store_with(assets: &[(&str, usize)]) -> MemoryBarStore {
        let store = MemoryBarStore::new();
        for (symbol, n) in assets {
            store.insert(linear_series(symbol, *n, 50.0, 0.1)).await;
        }
        store
    }

    fn config(min_assets: usize, min_bars: usize) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.freshness.min_assets = min_assets;
        config.freshness.min_bars = min_bars;
        config
    }

    #[tokio::test]
    async fn test_fresh_data_passes() {
        let store = store_with(&[("aapl", 450), ("msft", 450), ("spy", 450)]).await;
        let report = check_freshness(&store, &config(2, 400), day(452)).await.unwrap();
        assert!(report.is_fresh(), "{:?}", report.problems);
        // the market index is not counted as a training asset
        assert_eq!(report.active_assets, 2);
        assert_eq!(report.newest_bar, Some(day(449)));
    }

    #[tokio::test]
    async fn test_stale_data_fails() {
        let store = store_with(&[("aapl", 450), ("msft", 450)]).await;
        let report = check_freshness(&store, &config(2, 400), day(470)).await.unwrap();
        assert!(!report.is_fresh());
        assert_eq!(report.stale_assets.len(), 2);
    }

    #[tokio::test]
    async fn test_too_few_and_short_assets_fail() {
        let store = store_with(&[("aapl", 450), ("msft", 100)]).await;
        let report = check_freshness(&store, &config(3, 400), day(450)).await.unwrap();
        assert_eq!(report.short_assets, vec!["msft"]);
        assert_eq!(report.problems.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store_fails() {
        let store = MemoryBarStore::new();
        let report = check_freshness(&store, &config(1, 10), day(0)).await.unwrap();
        assert!(report.problems.iter().any(|p| p == "no price data"));
    }
}
