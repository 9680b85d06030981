use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use super::encoder::AssetEncoder;
use super::features::{FeatureAssembler, FeatureFrame, MarketContext};
use crate::config::TrainingConfig;
use crate::database::BarStore;
use crate::error::{ForecastError, Result};

/// Pooled feature rows of every usable asset
#[derive(Debug, Clone)]
pub struct Dataset {
    pub frame: FeatureFrame,
    pub encoder: AssetEncoder,
    pub assets_used: Vec<String>,
    pub assets_skipped: Vec<String>,
}

/// One global chronological partition of a [`Dataset`]
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: FeatureFrame,
    pub test: FeatureFrame,
    /// Rows at or before the cutoff train, rows after it test
    pub cutoff: DateTime<Utc>,
}

/// Candidate training assets: market index and control tables removed, sorted
pub fn training_universe(symbols: &[String], config: &TrainingConfig) -> Vec<String> {
    let dataset = &config.dataset;
    let mut universe: Vec<String> = symbols
        .iter()
        .filter(|s| !dataset.excluded_symbols.iter().any(|e| e.eq_ignore_ascii_case(s)))
        .filter(|s| {
            dataset
                .market_symbol
                .as_deref()
                .map_or(true, |m| !m.eq_ignore_ascii_case(s))
        })
        .cloned()
        .collect();
    universe.sort();
    universe.dedup();
    universe
}

/// Load the market series once for relative features, if enabled
pub async fn load_market_context(
    store: &dyn BarStore,
    config: &TrainingConfig,
) -> Result<Option<MarketContext>> {
    if !config.features.market_features {
        return Ok(None);
    }
    let symbol = config.dataset.market_symbol.as_deref().ok_or_else(|| {
        ForecastError::InvalidConfig("market features need dataset.market_symbol".to_string())
    })?;
    let series = store.load_bars(symbol).await?;
    if series.len() < 2 {
        return Err(ForecastError::InsufficientData {
            symbol: symbol.to_string(),
            available: series.len(),
            required: 2,
        });
    }
    info!("Market context: {} bars of {}", series.len(), symbol);
    Ok(Some(MarketContext::from_series(&series, &config.features)))
}

/// Builds the pooled multi-asset dataset from a bar store
pub struct DatasetBuilder<'a> {
    store: &'a dyn BarStore,
    config: &'a TrainingConfig,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(store: &'a dyn BarStore, config: &'a TrainingConfig) -> Self {
        Self { store, config }
    }

    /// Assemble every asset; per-asset load or feature failures are logged
    /// and the asset skipped.
    ///
    /// Fails when the asset list cannot be read, when market features are
    /// enabled without a usable market series, or when no asset contributes
    /// a row.
    pub async fn build(&self) -> Result<Dataset> {
        let listed = self.store.list_assets().await?;
        let universe = training_universe(&listed, self.config);
        info!("Found {} candidate assets ({} listed)", universe.len(), listed.len());

        let market = load_market_context(self.store, self.config).await?;
        let encoder = AssetEncoder::fit(&universe);
        let assembler = FeatureAssembler::new(
            &self.config.features,
            &self.config.target,
            self.config.dataset.min_bars,
        );

        let mut frame = FeatureFrame::new(assembler.columns());
        let mut assets_used = Vec::new();
        let mut assets_skipped = Vec::new();

        for symbol in &universe {
            let code = encoder.encode(symbol)?;
            let assembled = match self.store.load_bars(symbol).await {
                Ok(series) => assembler.assemble(&series, code, market.as_ref()),
                Err(e) => Err(e),
            };
            match assembled {
                Ok(asset_frame) => {
                    info!("  {}: {} rows", symbol, asset_frame.n_rows());
                    frame.append(asset_frame)?;
                    assets_used.push(symbol.clone());
                }
                Err(e) => {
                    warn!("Skipping {}: {}", symbol, e);
                    assets_skipped.push(symbol.clone());
                }
            }
        }

        if frame.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }

        info!(
            "Dataset: {} rows from {} assets ({} skipped)",
            frame.n_rows(),
            assets_used.len(),
            assets_skipped.len()
        );

        Ok(Dataset {
            frame,
            encoder,
            assets_used,
            assets_skipped,
        })
    }
}

/// Linearly interpolated `q`-quantile of the timestamps, at millisecond precision
pub fn timestamp_quantile(timestamps: &[DateTime<Utc>], q: f64) -> Option<DateTime<Utc>> {
    if timestamps.is_empty() {
        return None;
    }
    let mut millis: Vec<i64> = timestamps.iter().map(|ts| ts.timestamp_millis()).collect();
    millis.sort_unstable();

    let pos = q.clamp(0.0, 1.0) * (millis.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    let value = millis[lower] as f64 + (millis[upper] - millis[lower]) as f64 * frac;
    Utc.timestamp_millis_opt(value.round() as i64).single()
}

impl Dataset {
    /// Split every asset at the same instant so no test row precedes any
    /// training row of another asset.
    pub fn split(&self, quantile: f64) -> Result<TrainTestSplit> {
        let timestamps = self.frame.timestamps();
        let cutoff = timestamp_quantile(timestamps, quantile).ok_or(ForecastError::EmptyDataset)?;

        let (train_idx, test_idx): (Vec<usize>, Vec<usize>) =
            (0..self.frame.n_rows()).partition(|&i| timestamps[i] <= cutoff);

        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(ForecastError::Training(format!(
                "split at {} leaves {} train / {} test rows",
                cutoff,
                train_idx.len(),
                test_idx.len()
            )));
        }

        let split = TrainTestSplit {
            train: self.frame.select(&train_idx),
            test: self.frame.select(&test_idx),
            cutoff,
        };
        info!(
            "Split at {}: {} train / {} test rows",
            cutoff.format("%Y-%m-%d"),
            split.train.n_rows(),
            split.test.n_rows()
        );
        Ok(split)
    }
}
