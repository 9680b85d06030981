use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::binning::FeatureBins;
use super::objective::{softmax_into, Objective};
use super::tree::{Tree, TreeBuilder};
use super::GbdtParams;
use crate::error::{ForecastError, Result};

/// Bumped whenever the serialized model layout changes
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Feature matrix with labels and optional per-row weights
#[derive(Debug, Clone, Copy)]
pub struct TrainData<'a> {
    pub x: ArrayView2<'a, f64>,
    pub y: &'a [f64],
    pub weights: Option<&'a [f64]>,
}

impl<'a> TrainData<'a> {
    pub fn new(x: ArrayView2<'a, f64>, y: &'a [f64]) -> Self {
        Self { x, y, weights: None }
    }

    pub fn with_weights(mut self, weights: &'a [f64]) -> Self {
        self.weights = Some(weights);
        self
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.x.nrows() != self.y.len() {
            return Err(ForecastError::Training(format!(
                "{} has {} rows but {} labels",
                what,
                self.x.nrows(),
                self.y.len()
            )));
        }
        if let Some(w) = self.weights {
            if w.len() != self.y.len() {
                return Err(ForecastError::Training(format!(
                    "{} has {} weights for {} rows",
                    what,
                    w.len(),
                    self.y.len()
                )));
            }
        }
        Ok(())
    }
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtModel {
    pub format_version: u32,
    pub objective: Objective,
    pub n_features: usize,
    pub base_score: Vec<f64>,
    /// One entry per boosting round, each holding one tree per output
    pub trees: Vec<Vec<Tree>>,
    /// Zero-based round with the best evaluation score
    pub best_iteration: usize,
    pub best_score: Option<f64>,
    /// Evaluation metric after every round that was trained
    pub eval_history: Vec<f64>,
}

impl GbdtModel {
    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_margin_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features {
            return Err(ForecastError::FeatureMismatch(format!(
                "model expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let mut margins = self.base_score.clone();
        for round in &self.trees {
            for (m, tree) in margins.iter_mut().zip(round) {
                *m += tree.predict_row(row);
            }
        }
        Ok(margins)
    }

    /// Regression value, or class probabilities for softmax
    pub fn predict_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        let margins = self.predict_margin_row(row)?;
        Ok(match self.objective {
            Objective::SquaredError => margins,
            Objective::Softmax { num_class } => {
                let mut probs = vec![0.0; num_class];
                softmax_into(&margins, &mut probs);
                probs
            }
        })
    }

    /// Row-major margins for every row of `x`
    pub fn predict_margins(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(ForecastError::FeatureMismatch(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let k = self.objective.num_outputs();
        let mut out = Array2::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..k {
                out[[i, c]] = self.base_score[c]
                    + self
                        .trees
                        .iter()
                        .map(|round| round[c].predict_with(|f| row[f]))
                        .sum::<f64>();
            }
        }
        Ok(out)
    }

    /// Regression values or predicted class indices
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        let margins = self.predict_margins(x)?;
        Ok(match self.objective {
            Objective::SquaredError => margins.column(0).to_vec(),
            Objective::Softmax { .. } => margins
                .rows()
                .into_iter()
                .map(|row| argmax(row.iter().copied()) as f64)
                .collect(),
        })
    }

    /// Total split gain per feature, normalised to sum to one
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut importance = vec![0.0; self.n_features];
        for tree in self.trees.iter().flatten() {
            tree.accumulate_gain(&mut importance);
        }
        let total: f64 = importance.iter().sum();
        if total > 0.0 {
            importance.iter_mut().for_each(|v| *v /= total);
        }
        importance
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: GbdtModel = serde_json::from_str(json)?;
        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(ForecastError::Training(format!(
                "unsupported model format version {}",
                model.format_version
            )));
        }
        Ok(model)
    }
}

pub fn argmax(values: impl Iterator<Item = f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// Fit a boosted ensemble on `train`, early-stopping on `eval` when given.
///
/// The returned model is truncated to its best evaluation round.
pub fn train(
    params: &GbdtParams,
    objective: Objective,
    train: TrainData,
    eval: Option<TrainData>,
) -> Result<GbdtModel> {
    params
        .validate()
        .map_err(|errors| ForecastError::Training(errors.join(", ")))?;
    train.check("training set")?;
    if train.y.is_empty() {
        return Err(ForecastError::Training("training set is empty".to_string()));
    }
    if let Some(eval) = &eval {
        eval.check("evaluation set")?;
        if eval.x.ncols() != train.x.ncols() {
            return Err(ForecastError::FeatureMismatch(format!(
                "evaluation set has {} features, training set {}",
                eval.x.ncols(),
                train.x.ncols()
            )));
        }
    }
    if let Objective::Softmax { num_class } = objective {
        let mut labels = train.y.iter().chain(eval.iter().flat_map(|e| e.y.iter()));
        if labels.any(|y| y.fract() != 0.0 || *y < 0.0 || *y as usize >= num_class) {
            return Err(ForecastError::Training(format!(
                "class labels must be integers in [0, {})",
                num_class
            )));
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.n_jobs.max(1))
        .build()
        .map_err(|e| ForecastError::Training(e.to_string()))?;

    Ok(pool.install(|| boost(params, objective, train, eval)))
}

fn boost(
    params: &GbdtParams,
    objective: Objective,
    train: TrainData,
    eval: Option<TrainData>,
) -> GbdtModel {
    let n = train.y.len();
    let n_features = train.x.ncols();
    let k = objective.num_outputs();

    let unit_weights;
    let weights = match train.weights {
        Some(w) => w,
        None => {
            unit_weights = vec![1.0; n];
            &unit_weights
        }
    };

    let bins = FeatureBins::fit(train.x, params.max_bins);
    let binned = bins.transform(train.x);
    let base_score = objective.base_score(train.y, weights);

    let mut margins: Vec<f64> = (0..n).flat_map(|_| base_score.iter().copied()).collect();
    let mut eval_margins: Vec<f64> = eval
        .map(|e| (0..e.y.len()).flat_map(|_| base_score.iter().copied()).collect())
        .unwrap_or_default();

    let mut grad = vec![0.0; n * k];
    let mut hess = vec![0.0; n * k];
    let mut class_grad = vec![0.0; n];
    let mut class_hess = vec![0.0; n];
    let mut rng = StdRng::seed_from_u64(params.seed);
    let all_features: Vec<usize> = (0..n_features).collect();
    let n_sampled_features = ((n_features as f64 * params.colsample_bytree).round() as usize)
        .clamp(1, n_features.max(1));

    let mut trees: Vec<Vec<Tree>> = Vec::new();
    let mut eval_history = Vec::new();
    let mut best_iteration = 0;
    let mut best_score: Option<f64> = None;

    for round in 0..params.n_estimators {
        objective.gradients(&margins, train.y, weights, &mut grad, &mut hess);

        let mut rows: Vec<usize> = if params.subsample < 1.0 {
            (0..n).filter(|_| rng.gen::<f64>() < params.subsample).collect()
        } else {
            (0..n).collect()
        };
        if rows.is_empty() {
            rows = (0..n).collect();
        }

        let mut round_trees = Vec::with_capacity(k);
        for c in 0..k {
            for i in 0..n {
                class_grad[i] = grad[i * k + c];
                class_hess[i] = hess[i * k + c];
            }
            let mut features: Vec<usize> = all_features
                .choose_multiple(&mut rng, n_sampled_features)
                .copied()
                .collect();
            features.sort_unstable();

            let tree = TreeBuilder {
                binned: &binned,
                bins: &bins,
                grad: &class_grad,
                hess: &class_hess,
                features: &features,
                params,
            }
            .build(rows.clone());

            for i in 0..n {
                margins[i * k + c] += tree.predict_binned(&binned, i);
            }
            if let Some(eval) = &eval {
                for (i, row) in eval.x.rows().into_iter().enumerate() {
                    eval_margins[i * k + c] += tree.predict_with(|f| row[f]);
                }
            }
            round_trees.push(tree);
        }
        trees.push(round_trees);

        let Some(eval) = &eval else {
            continue;
        };
        let score = objective.evaluate(&eval_margins, eval.y);
        eval_history.push(score);
        if round % 50 == 0 {
            debug!("[{}] eval-{}: {:.6}", round, objective.metric_name(), score);
        }

        if best_score.map_or(true, |best| score < best) {
            best_score = Some(score);
            best_iteration = round;
        } else if params.early_stopping_rounds > 0
            && round - best_iteration >= params.early_stopping_rounds
        {
            info!(
                "Early stopping at round {}: best {} {:.6} at round {}",
                round,
                objective.metric_name(),
                best_score.unwrap_or(f64::NAN),
                best_iteration
            );
            break;
        }
    }

    if eval.is_some() {
        trees.truncate(best_iteration + 1);
    } else {
        best_iteration = trees.len().saturating_sub(1);
    }

    GbdtModel {
        format_version: MODEL_FORMAT_VERSION,
        objective,
        n_features,
        base_score,
        trees,
        best_iteration,
        best_score,
        eval_history,
    }
}
