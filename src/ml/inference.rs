use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::features::{warmup_period, Direction, FeatureAssembler, MarketContext};
use super::gbdt::booster::argmax;
use super::gbdt::Objective;
use super::persistence::ModelArtifacts;
use crate::database::BarStore;
use crate::error::{ForecastError, Result};
use crate::types::BarSeries;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionOutput {
    Return {
        predicted_return: f64,
        predicted_price: f64,
    },
    Direction {
        direction: Direction,
        /// DOWN, NEUTRAL, UP
        probabilities: [f64; 3],
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub symbol: String,
    /// Timestamp of the bar the features were computed on
    pub as_of: DateTime<Utc>,
    pub current_price: f64,
    pub horizon: usize,
    #[serde(flatten)]
    pub output: PredictionOutput,
    pub model_version: String,
}

impl ModelArtifacts {
    /// Bars of history needed before the newest row has every feature
    pub fn required_history(&self) -> usize {
        warmup_period(&self.metadata.features) + 1
    }

    /// Predict from an asset's recent bars using the training-time layout
    pub fn predict(
        &self,
        series: &BarSeries,
        market: Option<&MarketContext>,
    ) -> Result<Prediction> {
        let symbol = series.symbol();
        let code = self.encoder.encode(symbol)?;

        let meta = &self.metadata;
        let assembler = FeatureAssembler::new(&meta.features, &meta.target, 0);
        let latest = assembler.latest_row(series, code, market)?;
        if latest.values.len() != self.feature_names.len() {
            return Err(ForecastError::FeatureMismatch(format!(
                "assembled {} features, model was trained on {}",
                latest.values.len(),
                self.feature_names.len()
            )));
        }

        let raw = self.model.predict_row(&latest.values)?;
        let output = match self.model.objective {
            Objective::SquaredError => {
                let predicted_return = raw[0];
                PredictionOutput::Return {
                    predicted_return,
                    predicted_price: latest.close * (1.0 + predicted_return),
                }
            }
            Objective::Softmax { .. } => {
                let mut probabilities = [0.0; 3];
                for (p, r) in probabilities.iter_mut().zip(&raw) {
                    *p = *r;
                }
                let direction = Direction::from_index(argmax(raw.iter().copied()))
                    .unwrap_or(Direction::Neutral);
                PredictionOutput::Direction {
                    direction,
                    probabilities,
                }
            }
        };

        debug!("Prediction for {} as of {}: {:?}", symbol, latest.timestamp, output);
        Ok(Prediction {
            symbol: symbol.to_string(),
            as_of: latest.timestamp,
            current_price: latest.close,
            horizon: meta.target.horizon,
            output,
            model_version: meta.model_version(),
        })
    }
}

/// Process-wide model handle: loads the artifact directory on first use and
/// shares it read-only afterwards.
pub struct ModelHandle {
    dir: PathBuf,
    artifacts: OnceCell<Arc<ModelArtifacts>>,
}

impl ModelHandle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            artifacts: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_loaded(&self) -> bool {
        self.artifacts.initialized()
    }

    pub async fn get(&self) -> Result<Arc<ModelArtifacts>> {
        let artifacts = self
            .artifacts
            .get_or_try_init(|| async {
                let dir = self.dir.clone();
                let loaded = tokio::task::spawn_blocking(move || ModelArtifacts::load(&dir))
                    .await
                    .map_err(|e| {
                        ForecastError::Training(format!("model load task failed: {}", e))
                    })??;
                Ok::<_, ForecastError>(Arc::new(loaded))
            })
            .await?;
        Ok(Arc::clone(artifacts))
    }

    /// Load `symbol` (and the market series when the model uses it) and predict
    pub async fn predict_from_store(
        &self,
        store: &dyn BarStore,
        symbol: &str,
    ) -> Result<Prediction> {
        let artifacts = self.get().await?;
        let features = &artifacts.metadata.features;

        let market = if features.market_features {
            let market_symbol = artifacts.metadata.market_symbol.as_deref().ok_or_else(|| {
                ForecastError::FeatureMismatch(
                    "model uses market features but records no market symbol".to_string(),
                )
            })?;
            let series = store.load_bars(market_symbol).await?;
            Some(MarketContext::from_series(&series, features))
        } else {
            None
        };

        let series = store.load_bars(symbol).await?;
        artifacts.predict(&series, market.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryBarStore;
    use crate::ml::persistence::tests::sample_artifacts;
    use crate::ml::persistence::ArtifactWriter;
    use crate::types::fixtures::random_walk_series;

    #[test]
    fn test_regression_prediction() {
        let artifacts = sample_artifacts();
        let series = random_walk_series("aapl", 120, 4);
        let prediction = artifacts.predict(&series, None).unwrap();

        assert_eq!(prediction.symbol, "aapl");
        assert_eq!(prediction.as_of, series.last().unwrap().timestamp);
        assert_eq!(prediction.horizon, 5);
        match prediction.output {
            PredictionOutput::Return {
                predicted_return,
                predicted_price,
            } => {
                let expected = prediction.current_price * (1.0 + predicted_return);
                assert!((predicted_price - expected).abs() < 1e-9);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_unknown_asset_and_short_history() {
        let artifacts = sample_artifacts();
        let unknown = random_walk_series("tsla", 120, 4);
        assert!(matches!(
            artifacts.predict(&unknown, None),
            Err(ForecastError::UnknownAsset(_))
        ));

        let short = random_walk_series("aapl", artifacts.required_history() - 1, 4);
        assert!(matches!(
            artifacts.predict(&short, None),
            Err(ForecastError::InsufficientData { .. })
        ));
        let enough = random_walk_series("aapl", artifacts.required_history(), 4);
        assert!(artifacts.predict(&enough, None).is_ok());
    }

    #[tokio::test]
    async fn test_handle_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        ArtifactWriter::new(dir.path()).write(&sample_artifacts()).unwrap();

        let handle = ModelHandle::new(dir.path());
        assert!(!handle.is_loaded());
        let first = handle.get().await.unwrap();
        let second = handle.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let store = MemoryBarStore::new();
        store.insert(random_walk_series("msft", 150, 2)).await;
        let prediction = handle.predict_from_store(&store, "msft").await.unwrap();
        assert_eq!(prediction.symbol, "msft");
    }

    #[tokio::test]
    async fn test_handle_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ModelHandle::new(dir.path().join("absent"));
        assert!(matches!(handle.get().await, Err(ForecastError::Io(_))));
        assert!(!handle.is_loaded());
    }
}
