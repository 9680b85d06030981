//! End-to-end training run: bars in, artifact directory out.

pub mod freshness;

pub use freshness::{check_freshness, FreshnessReport};

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::database::BarStore;
use crate::error::{ForecastError, Result};
use crate::ml::features::feature_names;
use crate::ml::metrics::EvaluationMetrics;
use crate::ml::persistence::{ArtifactWriter, ModelArtifacts, ModelMetadata};
use crate::ml::trainer::train_model;
use crate::ml::DatasetBuilder;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub output_dir: PathBuf,
    pub model_version: String,
    pub metrics: EvaluationMetrics,
    pub best_iteration: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub assets_trained: usize,
    pub assets_skipped: usize,
    pub backup: Option<PathBuf>,
}

pub async fn run_training(
    store: &dyn BarStore,
    config: &TrainingConfig,
    now: DateTime<Utc>,
) -> Result<TrainingSummary> {
    info!("━━━ Step 1/4: Building dataset ━━━");
    let dataset = DatasetBuilder::new(store, config).build().await?;

    info!("━━━ Step 2/4: Chronological split ━━━");
    let split = dataset.split(config.dataset.split_quantile)?;

    info!("━━━ Step 3/4: Training ━━━");
    // boosting is CPU-bound; run it on the blocking pool
    let task_config = config.clone();
    let (split, trained) = tokio::task::spawn_blocking(move || {
        let trained = train_model(&split, &task_config);
        (split, trained)
    })
    .await
    .map_err(|e| ForecastError::Training(format!("training task failed: {}", e)))?;
    let trained = trained?;

    info!("━━━ Step 4/4: Saving artifacts ━━━");
    let writer = ArtifactWriter::new(&config.output_dir);
    let backup = match &config.backup_dir {
        Some(root) => match writer.backup(root, now) {
            Ok(path) => path,
            Err(e) => {
                warn!("Artifact backup failed, continuing: {}", e);
                None
            }
        },
        None => None,
    };

    let metadata = ModelMetadata {
        model_type: "gbdt".to_string(),
        format_version: trained.model.format_version,
        training_date: now,
        target: config.target.clone(),
        features: config.features.clone(),
        market_symbol: config
            .features
            .market_features
            .then(|| config.dataset.market_symbol.clone())
            .flatten(),
        hyperparameters: trained.params.clone(),
        metrics: trained.metrics.clone(),
        best_iteration: trained.model.best_iteration,
        split_cutoff: split.cutoff,
        train_samples: split.train.n_rows(),
        test_samples: split.test.n_rows(),
        assets_trained: dataset.assets_used.clone(),
        assets_skipped: dataset.assets_skipped.clone(),
        class_weights: trained.class_weights,
        feature_importance: trained.model.feature_importance(),
    };
    let model_version = metadata.model_version();

    let artifacts = ModelArtifacts {
        model: trained.model,
        feature_names: feature_names(&config.features),
        metadata,
        encoder: dataset.encoder,
    };
    writer.write(&artifacts)?;

    Ok(TrainingSummary {
        output_dir: config.output_dir.clone(),
        model_version,
        metrics: trained.metrics,
        best_iteration: artifacts.model.best_iteration,
        train_rows: split.train.n_rows(),
        test_rows: split.test.n_rows(),
        assets_trained: dataset.assets_used.len(),
        assets_skipped: dataset.assets_skipped.len(),
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryBarStore;
    use crate::ml::gbdt::GbdtOverrides;
    use crate::ml::ModelHandle;
    use crate::types::fixtures::{day, random_walk_series};

    fn quick_config(output: &std::path::Path) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.output_dir = output.to_path_buf();
        config.job_count = 2;
        config.model = GbdtOverrides {
            n_estimators: Some(40),
            learning_rate: Some(0.1),
            max_depth: Some(3),
            early_stopping_rounds: Some(5),
            ..GbdtOverrides::default()
        };
        config
    }

    // default test runtime is current-thread
    #[tokio::test]
    async fn test_train_then_predict() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryBarStore::new();
        for (i, symbol) in ["aapl", "goog", "msft"].iter().enumerate() {
            store.insert(random_walk_series(symbol, 250, i as u64 + 1)).await;
        }
        let config = quick_config(&dir.path().join("model"));

        let summary = run_training(&store, &config, day(260)).await.unwrap();
        assert_eq!(summary.assets_trained, 3);
        assert_eq!(summary.train_rows + summary.test_rows, 3 * (250 - 49 - 5));
        assert!(summary.backup.is_none());

        let handle = ModelHandle::new(&config.output_dir);
        let prediction = handle.predict_from_store(&store, "goog").await.unwrap();
        assert_eq!(prediction.symbol, "goog");
        assert_eq!(prediction.model_version, summary.model_version);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_run_backs_up_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryBarStore::new();
        store.insert(random_walk_series("aapl", 200, 1)).await;
        store.insert(random_walk_series("msft", 200, 2)).await;
        let mut config = quick_config(&dir.path().join("model"));
        config.backup_dir = Some(dir.path().join("backups"));

        let first = run_training(&store, &config, day(210)).await.unwrap();
        assert!(first.backup.is_none());
        let second = run_training(&store, &config, day(211)).await.unwrap();
        let backup = second.backup.unwrap();
        assert!(backup.ends_with("20200730_000000"));
        assert!(backup.join("model.json").exists());
    }
}
