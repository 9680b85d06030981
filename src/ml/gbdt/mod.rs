//! Histogram-based gradient-boosted decision trees.
//!
//! Supports squared-error regression and 3-class softmax classification with
//! per-row sample weights, seeded row/column subsampling, L2 leaf
//! regularisation and early stopping on an evaluation set. Split search runs
//! on a dedicated rayon pool sized by [`GbdtParams::n_jobs`].

pub mod binning;
pub mod tree;
pub mod objective;
pub mod booster;

pub use binning::{BinnedMatrix, FeatureBins};
pub use booster::{train, GbdtModel, TrainData};
pub use objective::Objective;
pub use tree::{Node, Tree};

use serde::{Deserialize, Serialize};

use crate::config::TargetKind;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtParams {
    /// Maximum boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum hessian sum in each child of a split
    pub min_child_weight: f64,
    /// L2 regularisation on leaf values
    pub lambda: f64,
    /// Minimum loss reduction required to split
    pub gamma: f64,
    /// Fraction of rows sampled per round
    pub subsample: f64,
    /// Fraction of features sampled per tree
    pub colsample_bytree: f64,
    pub max_bins: usize,
    /// Stop after this many rounds without eval improvement; 0 disables
    pub early_stopping_rounds: usize,
    pub seed: u64,
    pub n_jobs: usize,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.01,
            max_depth: 8,
            min_child_weight: 1.0,
            lambda: 1.0,
            gamma: 0.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            max_bins: 256,
            early_stopping_rounds: 50,
            seed: 42,
            n_jobs: 4,
        }
    }
}

impl GbdtParams {
    pub fn default_for(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Regression => Self::default(),
            TargetKind::Classification => Self {
                n_estimators: 500,
                learning_rate: 0.02,
                early_stopping_rounds: 30,
                ..Self::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.n_estimators == 0 {
            errors.push("model.n_estimators must be > 0".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            errors.push("model.learning_rate must be in (0, 1]".to_string());
        }
        if self.max_depth == 0 {
            errors.push("model.max_depth must be > 0".to_string());
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            errors.push("model.subsample must be in (0, 1]".to_string());
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            errors.push("model.colsample_bytree must be in (0, 1]".to_string());
        }
        if !(2..=256).contains(&self.max_bins) {
            errors.push("model.max_bins must be between 2 and 256".to_string());
        }
        if self.lambda < 0.0 || self.gamma < 0.0 || self.min_child_weight < 0.0 {
            errors.push("model.lambda, gamma and min_child_weight must be >= 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A possibly partial `[model]` section. Unset fields keep the defaults of
/// the run's target kind; the thread count always comes from `job_count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_estimators: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_child_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsample: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colsample_bytree: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bins: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stopping_rounds: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GbdtOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer the set fields over `base`
    pub fn apply(&self, mut base: GbdtParams) -> GbdtParams {
        if let Some(v) = self.n_estimators {
            base.n_estimators = v;
        }
        if let Some(v) = self.learning_rate {
            base.learning_rate = v;
        }
        if let Some(v) = self.max_depth {
            base.max_depth = v;
        }
        if let Some(v) = self.min_child_weight {
            base.min_child_weight = v;
        }
        if let Some(v) = self.lambda {
            base.lambda = v;
        }
        if let Some(v) = self.gamma {
            base.gamma = v;
        }
        if let Some(v) = self.subsample {
            base.subsample = v;
        }
        if let Some(v) = self.colsample_bytree {
            base.colsample_bytree = v;
        }
        if let Some(v) = self.max_bins {
            base.max_bins = v;
        }
        if let Some(v) = self.early_stopping_rounds {
            base.early_stopping_rounds = v;
        }
        if let Some(v) = self.seed {
            base.seed = v;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_keep_unset_fields() {
        let overrides = GbdtOverrides {
            max_depth: Some(5),
            ..GbdtOverrides::default()
        };
        let clf = overrides.apply(GbdtParams::default_for(TargetKind::Classification));
        assert_eq!(clf.max_depth, 5);
        assert_eq!(clf.n_estimators, 500);
        assert_eq!(clf.learning_rate, 0.02);
        assert!(GbdtOverrides::default().is_empty());
        assert!(!overrides.is_empty());
    }

    #[test]
    fn test_defaults_per_target() {
        let reg = GbdtParams::default_for(TargetKind::Regression);
        assert_eq!(reg.n_estimators, 1000);
        assert_eq!(reg.early_stopping_rounds, 50);
        let clf = GbdtParams::default_for(TargetKind::Classification);
        assert_eq!(clf.n_estimators, 500);
        assert_eq!(clf.learning_rate, 0.02);
        assert_eq!(clf.early_stopping_rounds, 30);
        assert_eq!(clf.max_depth, 8);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let params = GbdtParams {
            learning_rate: 0.0,
            subsample: 1.5,
            max_bins: 1000,
            ..GbdtParams::default()
        };
        assert_eq!(params.validate().unwrap_err().len(), 3);
        assert!(GbdtParams::default().validate().is_ok());
    }
}
