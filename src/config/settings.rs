use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ml::gbdt::{GbdtOverrides, GbdtParams};

/// Immutable configuration for one training run.
///
/// Built once by [`super::load_config`] and passed by reference; nothing
/// mutates it after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub output_dir: PathBuf,
    pub job_count: usize,
    /// Read bars from a local SQLite file instead of PostgreSQL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
    /// Timestamped copies of the artifact directory land here when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    pub target: TargetSettings,
    pub features: FeatureConfig,
    pub dataset: DatasetSettings,
    /// Boosting parameters layered over the target kind's defaults
    #[serde(skip_serializing_if = "GbdtOverrides::is_empty")]
    pub model: GbdtOverrides,
    pub search: SearchSettings,
    pub freshness: FreshnessPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "market_data".to_string(),
            user: "mluser".to_string(),
            password: "mlpassword".to_string(),
            output_dir: PathBuf::from("./model_artifacts"),
            job_count: 4,
            sqlite_path: None,
            backup_dir: None,
            target: TargetSettings::default(),
            features: FeatureConfig::default(),
            dataset: DatasetSettings::default(),
            model: GbdtOverrides::default(),
            search: SearchSettings::default(),
            freshness: FreshnessPolicy::default(),
        }
    }
}

impl TrainingConfig {
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    /// Boosting parameters for this run, with the thread count taken from `job_count`
    pub fn gbdt_params(&self) -> GbdtParams {
        let mut params = self.model.apply(GbdtParams::default_for(self.target.kind));
        params.n_jobs = self.job_count;
        params
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.job_count == 0 {
            errors.push("job_count must be > 0".to_string());
        }
        if self.target.horizon == 0 {
            errors.push("target.horizon must be > 0".to_string());
        }
        if self.target.up_threshold <= 0.0 || self.target.down_threshold >= 0.0 {
            errors.push("target thresholds must straddle zero".to_string());
        }
        if !(self.dataset.split_quantile > 0.0 && self.dataset.split_quantile < 1.0) {
            errors.push("dataset.split_quantile must be in (0, 1)".to_string());
        }
        if self.features.market_features && self.dataset.market_symbol.is_none() {
            errors.push(
                "dataset.market_symbol is required when market features are enabled".to_string(),
            );
        }

        let f = &self.features;
        if f.return_lags.is_empty() || f.return_lags.contains(&0) {
            errors.push("features.return_lags must be non-empty and positive".to_string());
        }
        if f.sma_windows.is_empty() || f.sma_windows.contains(&0) {
            errors.push("features.sma_windows must be non-empty and positive".to_string());
        }
        if f.macd_fast >= f.macd_slow {
            errors.push("features.macd_fast must be < features.macd_slow".to_string());
        }
        if f.rsi_period == 0 || f.macd_signal == 0 || f.volume_window == 0 {
            errors.push("features periods must be > 0".to_string());
        }
        if f.bollinger_window < 2 || f.volatility_window < 2 {
            errors.push("features.bollinger_window and volatility_window must be >= 2".to_string());
        }

        if let Err(mut model_errors) = self.gbdt_params().validate() {
            errors.append(&mut model_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Raw forward fractional return
    Regression,
    /// DOWN / NEUTRAL / UP bucket of the forward return
    Classification,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Regression => "regression",
            TargetKind::Classification => "classification",
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regression" | "reg" => Ok(TargetKind::Regression),
            "classification" | "clf" => Ok(TargetKind::Classification),
            _ => Err(format!("unknown target kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub kind: TargetKind,
    /// Bars ahead at which the target is measured
    pub horizon: usize,
    pub up_threshold: f64,
    pub down_threshold: f64,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            kind: TargetKind::Regression,
            horizon: 5,
            up_threshold: 0.003,
            down_threshold: -0.003,
        }
    }
}

/// Window lengths and lags of every engineered column. Recorded verbatim in
/// the artifact metadata so inference rebuilds the identical layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub return_lags: Vec<usize>,
    pub sma_windows: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_window: usize,
    pub bollinger_std: f64,
    pub volatility_window: usize,
    pub volume_window: usize,
    pub calendar_features: bool,
    pub market_features: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            return_lags: vec![1, 5, 10, 20],
            sma_windows: vec![10, 20, 50],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_window: 20,
            bollinger_std: 2.0,
            volatility_window: 20,
            volume_window: 20,
            calendar_features: true,
            market_features: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// Market index series used for relative features; never a training asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_symbol: Option<String>,
    /// Metadata/control entries that are not tradable assets
    pub excluded_symbols: Vec<String>,
    pub min_bars: usize,
    pub split_quantile: f64,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            market_symbol: Some("spy".to_string()),
            excluded_symbols: vec![
                "abcde".to_string(),
                "modelfeatures".to_string(),
                "sectors".to_string(),
                "stock_metadata".to_string(),
            ],
            min_bars: 100,
            split_quantile: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Randomized search candidates; 0 trains the configured parameters directly
    pub iterations: usize,
    pub folds: usize,
    pub seed: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            iterations: 0,
            folds: 3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessPolicy {
    pub min_assets: usize,
    pub max_age_days: i64,
    pub min_bars: usize,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            min_assets: 5,
            max_age_days: 7,
            min_bars: 400,
        }
    }
}
