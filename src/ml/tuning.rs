use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

use super::features::FeatureFrame;
use super::gbdt::{self, GbdtParams, Objective, TrainData};
use crate::config::SearchSettings;
use crate::error::{ForecastError, Result};

const LEARNING_RATES: [f64; 4] = [0.01, 0.02, 0.05, 0.1];
const MAX_DEPTHS: [usize; 5] = [3, 4, 5, 6, 8];
const MIN_CHILD_WEIGHTS: [f64; 3] = [1.0, 3.0, 5.0];
const FRACTIONS: [f64; 5] = [0.6, 0.7, 0.8, 0.9, 1.0];
const LAMBDAS: [f64; 3] = [0.0, 1.0, 5.0];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTrial {
    pub params: GbdtParams,
    /// Mean best eval metric across folds
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best_params: GbdtParams,
    pub best_score: f64,
    pub trials: Vec<SearchTrial>,
}

/// Expanding-window folds over ascending `timestamps`: each fold trains on a
/// prefix and validates on the block right after it.
///
/// Boundaries move forward past rows sharing a timestamp, so every fit row is
/// strictly older than every validation row of its fold. Folds left empty by
/// that shift are dropped.
pub fn time_series_folds(
    timestamps: &[DateTime<Utc>],
    folds: usize,
) -> Vec<(Range<usize>, Range<usize>)> {
    let n = timestamps.len();
    if folds == 0 || n < folds + 1 {
        return Vec::new();
    }
    let block = n / (folds + 1);
    let snap = |mut b: usize| {
        while b > 0 && b < n && timestamps[b] == timestamps[b - 1] {
            b += 1;
        }
        b
    };

    let mut bounds: Vec<usize> = (0..folds).map(|i| snap(n - block * (folds - i))).collect();
    bounds.push(n);

    bounds
        .windows(2)
        .filter(|w| w[0] < w[1])
        .map(|w| (0..w[0], w[0]..w[1]))
        .collect()
}

fn sample_params(base: &GbdtParams, rng: &mut StdRng) -> GbdtParams {
    GbdtParams {
        learning_rate: *LEARNING_RATES.choose(rng).unwrap_or(&base.learning_rate),
        max_depth: *MAX_DEPTHS.choose(rng).unwrap_or(&base.max_depth),
        min_child_weight: *MIN_CHILD_WEIGHTS.choose(rng).unwrap_or(&base.min_child_weight),
        subsample: *FRACTIONS.choose(rng).unwrap_or(&base.subsample),
        colsample_bytree: *FRACTIONS.choose(rng).unwrap_or(&base.colsample_bytree),
        lambda: *LAMBDAS.choose(rng).unwrap_or(&base.lambda),
        ..base.clone()
    }
}

/// Randomized hyperparameter search on time-series folds of the training
/// partition. The test partition is never touched here.
pub fn randomized_search(
    base: &GbdtParams,
    objective: Objective,
    train: &FeatureFrame,
    weights: Option<&[f64]>,
    settings: &SearchSettings,
) -> Result<SearchResult> {
    let timestamps = train.timestamps();
    let mut order: Vec<usize> = (0..train.n_rows()).collect();
    order.sort_by_key(|&i| timestamps[i]);
    let sorted: Vec<DateTime<Utc>> = order.iter().map(|&i| timestamps[i]).collect();

    let folds = time_series_folds(&sorted, settings.folds);
    if folds.is_empty() {
        return Err(ForecastError::Training(format!(
            "{} rows cannot form {} search folds",
            order.len(),
            settings.folds
        )));
    }

    // materialise each fold once; every candidate reuses them
    let fold_data: Vec<_> = folds
        .iter()
        .map(|(fit, val)| {
            let fit_idx = &order[fit.clone()];
            let val_idx = &order[val.clone()];
            let fit_frame = train.select(fit_idx);
            let val_frame = train.select(val_idx);
            let fit_weights: Option<Vec<f64>> =
                weights.map(|w| fit_idx.iter().map(|&i| w[i]).collect());
            (fit_frame.to_array(), fit_frame, fit_weights, val_frame.to_array(), val_frame)
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut trials = Vec::with_capacity(settings.iterations);

    for iteration in 0..settings.iterations {
        let params = sample_params(base, &mut rng);
        let mut total = 0.0;
        for (fit_x, fit_frame, fit_weights, val_x, val_frame) in &fold_data {
            let mut fit = TrainData::new(fit_x.view(), fit_frame.targets());
            if let Some(w) = fit_weights {
                fit = fit.with_weights(w);
            }
            let eval = TrainData::new(val_x.view(), val_frame.targets());
            let model = gbdt::train(&params, objective, fit, Some(eval))?;
            total += model.best_score.unwrap_or(f64::INFINITY);
        }
        let score = total / fold_data.len() as f64;
        debug!(
            "Search {}/{}: lr={} depth={} score={:.6}",
            iteration + 1,
            settings.iterations,
            params.learning_rate,
            params.max_depth,
            score
        );
        trials.push(SearchTrial { params, score });
    }

    let best = trials
        .iter()
        .min_by(|a, b| a.score.total_cmp(&b.score))
        .cloned()
        .ok_or_else(|| ForecastError::Training("search ran no candidates".to_string()))?;

    info!(
        "Search best {} {:.6}: lr={} depth={} subsample={} colsample={}",
        objective.metric_name(),
        best.score,
        best.params.learning_rate,
        best.params.max_depth,
        best.params.subsample,
        best.params.colsample_bytree
    );

    Ok(SearchResult {
        best_params: best.params,
        best_score: best.score,
        trials,
    })
}
