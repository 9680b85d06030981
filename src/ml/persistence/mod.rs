use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::encoder::AssetEncoder;
use super::features::feature_names;
use super::gbdt::{GbdtModel, GbdtParams};
use super::metrics::EvaluationMetrics;
use crate::config::{FeatureConfig, TargetSettings};
use crate::error::{ForecastError, Result};

pub const MODEL_FILE: &str = "model.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const ENCODER_FILE: &str = "ticker_encoder.json";

const ARTIFACT_FILES: [&str; 4] = [MODEL_FILE, FEATURE_NAMES_FILE, METADATA_FILE, ENCODER_FILE];

/// Everything needed to reproduce the feature layout and read the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub format_version: u32,
    pub training_date: DateTime<Utc>,
    pub target: TargetSettings,
    pub features: FeatureConfig,
    /// Index series joined for market features
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_symbol: Option<String>,
    pub hyperparameters: GbdtParams,
    pub metrics: EvaluationMetrics,
    pub best_iteration: usize,
    pub split_cutoff: DateTime<Utc>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub assets_trained: Vec<String>,
    pub assets_skipped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_weights: Option<[f64; 3]>,
    /// Normalised total split gain, aligned with `feature_names.json`
    pub feature_importance: Vec<f64>,
}

impl ModelMetadata {
    pub fn model_version(&self) -> String {
        format!(
            "{}-v{}-{}",
            self.model_type,
            self.format_version,
            self.training_date.format("%Y%m%d")
        )
    }
}

/// The four files of one trained model
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub model: GbdtModel,
    pub feature_names: Vec<String>,
    pub metadata: ModelMetadata,
    pub encoder: AssetEncoder,
}

impl ModelArtifacts {
    /// Reject artifact sets whose parts disagree about the feature layout
    pub fn verify(&self) -> Result<()> {
        let expected = feature_names(&self.metadata.features);
        if self.feature_names != expected {
            return Err(ForecastError::FeatureMismatch(format!(
                "feature_names.json {:?} does not match metadata layout {:?}",
                self.feature_names, expected
            )));
        }
        if self.model.n_features != self.feature_names.len() {
            return Err(ForecastError::FeatureMismatch(format!(
                "model expects {} features, feature_names.json lists {}",
                self.model.n_features,
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let model_json = std::fs::read_to_string(dir.join(MODEL_FILE))?;
        let artifacts = Self {
            model: GbdtModel::from_json(&model_json)?,
            feature_names: read_json(&dir.join(FEATURE_NAMES_FILE))?,
            metadata: read_json(&dir.join(METADATA_FILE))?,
            encoder: read_json(&dir.join(ENCODER_FILE))?,
        };
        artifacts.verify()?;
        info!(
            "Loaded model {} from {} ({} features, {} assets)",
            artifacts.metadata.model_version(),
            dir.display(),
            artifacts.feature_names.len(),
            artifacts.encoder.len()
        );
        Ok(artifacts)
    }
}

/// Writes artifact sets into a directory
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
            info!("Created artifact directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Write all four files, each through a temp file and rename
    pub fn write(&self, artifacts: &ModelArtifacts) -> Result<()> {
        artifacts.verify()?;
        self.ensure_dir()?;

        write_json(&self.dir.join(MODEL_FILE), &artifacts.model)?;
        write_json(&self.dir.join(FEATURE_NAMES_FILE), &artifacts.feature_names)?;
        write_json(&self.dir.join(METADATA_FILE), &artifacts.metadata)?;
        write_json(&self.dir.join(ENCODER_FILE), &artifacts.encoder)?;

        info!(
            "Saved model {} to {}",
            artifacts.metadata.model_version(),
            self.dir.display()
        );
        Ok(())
    }

    /// Copy the current artifact files into `backup_root/YYYYmmdd_HHMMSS`
    pub fn backup(&self, backup_root: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if !self.dir.join(MODEL_FILE).exists() {
            return Ok(None);
        }
        let target = backup_root.join(now.format("%Y%m%d_%H%M%S").to_string());
        std::fs::create_dir_all(&target)?;
        for name in ARTIFACT_FILES {
            let source = self.dir.join(name);
            if source.exists() {
                std::fs::copy(&source, target.join(name))?;
            } else {
                warn!("Backup: {} missing from {}", name, self.dir.display());
            }
        }
        info!("Backed up artifacts to {}", target.display());
        Ok(Some(target))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
