use tracing::info;

use super::dataset::TrainTestSplit;
use super::gbdt::{self, GbdtModel, GbdtParams, Objective, TrainData};
use super::metrics::{classification_metrics, regression_metrics, EvaluationMetrics};
use super::tuning::{randomized_search, SearchResult};
use crate::config::{TargetKind, TrainingConfig};
use crate::error::{ForecastError, Result};

/// Output of a full training run
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: GbdtModel,
    pub params: GbdtParams,
    pub metrics: EvaluationMetrics,
    pub class_weights: Option<[f64; 3]>,
    pub search: Option<SearchResult>,
}

pub fn objective_for(kind: TargetKind) -> Objective {
    match kind {
        TargetKind::Regression => Objective::SquaredError,
        TargetKind::Classification => Objective::Softmax { num_class: 3 },
    }
}

/// Inverse-frequency class weights, `total / (3 * count)`; 1.0 for absent classes
pub fn class_weights(labels: &[f64]) -> [f64; 3] {
    let mut counts = [0usize; 3];
    for y in labels {
        if let Some(c) = counts.get_mut(*y as usize) {
            *c += 1;
        }
    }
    let total = labels.len() as f64;
    let mut weights = [1.0; 3];
    for (w, count) in weights.iter_mut().zip(counts) {
        if count > 0 {
            *w = total / (3.0 * count as f64);
        }
    }
    weights
}

pub fn sample_weights(labels: &[f64], class_weights: &[f64; 3]) -> Vec<f64> {
    labels
        .iter()
        .map(|y| class_weights.get(*y as usize).copied().unwrap_or(1.0))
        .collect()
}

/// Fit on the train partition, early-stopping and scoring on the test partition
pub fn train_model(split: &TrainTestSplit, config: &TrainingConfig) -> Result<TrainedModel> {
    if split.test.is_empty() {
        return Err(ForecastError::Training("test partition is empty".to_string()));
    }

    let kind = config.target.kind;
    let objective = objective_for(kind);

    let weights = match kind {
        TargetKind::Regression => None,
        TargetKind::Classification => {
            let w = class_weights(split.train.targets());
            info!(
                "Class weights: DOWN {:.3}, NEUTRAL {:.3}, UP {:.3}",
                w[0], w[1], w[2]
            );
            Some(w)
        }
    };
    let row_weights = weights.map(|w| sample_weights(split.train.targets(), &w));

    let base_params = config.gbdt_params();
    let search = if config.search.iterations > 0 {
        info!(
            "Randomized search: {} candidates x {} folds",
            config.search.iterations, config.search.folds
        );
        Some(randomized_search(
            &base_params,
            objective,
            &split.train,
            row_weights.as_deref(),
            &config.search,
        )?)
    } else {
        None
    };
    let params = search
        .as_ref()
        .map(|s| s.best_params.clone())
        .unwrap_or(base_params);

    let x_train = split.train.to_array();
    let x_test = split.test.to_array();
    let mut train_data = TrainData::new(x_train.view(), split.train.targets());
    if let Some(w) = &row_weights {
        train_data = train_data.with_weights(w);
    }
    let eval_data = TrainData::new(x_test.view(), split.test.targets());

    info!(
        "Training {} model: {} rounds max, lr {}, depth {}, {} threads",
        kind.as_str(),
        params.n_estimators,
        params.learning_rate,
        params.max_depth,
        params.n_jobs
    );
    let model = gbdt::train(&params, objective, train_data, Some(eval_data))?;

    let predicted = model.predict(x_test.view())?;
    let metrics = match kind {
        TargetKind::Regression => {
            EvaluationMetrics::Regression(regression_metrics(&predicted, split.test.targets()))
        }
        TargetKind::Classification => EvaluationMetrics::Classification(classification_metrics(
            &predicted,
            split.test.targets(),
        )),
    };

    info!(
        "Model trained: best iteration {}, test {}",
        model.best_iteration,
        metrics.headline()
    );

    Ok(TrainedModel {
        model,
        params,
        metrics,
        class_weights: weights,
        search,
    })
}
