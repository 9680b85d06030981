use serde::{Deserialize, Serialize};

/// Loss being minimised by the booster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Objective {
    SquaredError,
    Softmax { num_class: usize },
}

const MIN_HESSIAN: f64 = 1e-6;
const PROB_CLIP: f64 = 1e-15;

impl Objective {
    /// Margins per row: one for regression, one per class for softmax
    pub fn num_outputs(&self) -> usize {
        match self {
            Objective::SquaredError => 1,
            Objective::Softmax { num_class } => *num_class,
        }
    }

    pub fn metric_name(&self) -> &'static str {
        match self {
            Objective::SquaredError => "rmse",
            Objective::Softmax { .. } => "mlogloss",
        }
    }

    /// Initial margin: weighted label mean for regression, zeros for softmax
    pub fn base_score(&self, labels: &[f64], weights: &[f64]) -> Vec<f64> {
        match self {
            Objective::SquaredError => {
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    return vec![0.0];
                }
                let mean = labels.iter().zip(weights).map(|(y, w)| y * w).sum::<f64>() / total;
                vec![mean]
            }
            Objective::Softmax { num_class } => vec![0.0; *num_class],
        }
    }

    /// Fill row-major `grad`/`hess` (n_rows x num_outputs) from current margins
    pub fn gradients(
        &self,
        margins: &[f64],
        labels: &[f64],
        weights: &[f64],
        grad: &mut [f64],
        hess: &mut [f64],
    ) {
        match self {
            Objective::SquaredError => {
                for i in 0..labels.len() {
                    grad[i] = (margins[i] - labels[i]) * weights[i];
                    hess[i] = weights[i];
                }
            }
            Objective::Softmax { num_class } => {
                let k = *num_class;
                let mut probs = vec![0.0; k];
                for i in 0..labels.len() {
                    softmax_into(&margins[i * k..(i + 1) * k], &mut probs);
                    let label = labels[i] as usize;
                    for c in 0..k {
                        let target = if c == label { 1.0 } else { 0.0 };
                        let p = probs[c];
                        grad[i * k + c] = (p - target) * weights[i];
                        hess[i * k + c] = (p * (1.0 - p)).max(MIN_HESSIAN) * weights[i];
                    }
                }
            }
        }
    }

    /// Unweighted evaluation metric; lower is better
    pub fn evaluate(&self, margins: &[f64], labels: &[f64]) -> f64 {
        if labels.is_empty() {
            return f64::NAN;
        }
        match self {
            Objective::SquaredError => {
                let sse: f64 = margins
                    .iter()
                    .zip(labels)
                    .map(|(p, y)| (p - y).powi(2))
                    .sum();
                (sse / labels.len() as f64).sqrt()
            }
            Objective::Softmax { num_class } => {
                let k = *num_class;
                let mut probs = vec![0.0; k];
                let total: f64 = labels
                    .iter()
                    .enumerate()
                    .map(|(i, y)| {
                        softmax_into(&margins[i * k..(i + 1) * k], &mut probs);
                        -probs[*y as usize].clamp(PROB_CLIP, 1.0 - PROB_CLIP).ln()
                    })
                    .sum();
                total / labels.len() as f64
            }
        }
    }
}

/// Numerically stable softmax
pub fn softmax_into(margins: &[f64], out: &mut [f64]) {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (o, m) in out.iter_mut().zip(margins) {
        *o = (m - max).exp();
        sum += *o;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_error_gradients() {
        let obj = Objective::SquaredError;
        let mut grad = vec![0.0; 2];
        let mut hess = vec![0.0; 2];
        obj.gradients(&[1.0, 0.0], &[0.5, 1.0], &[1.0, 2.0], &mut grad, &mut hess);
        assert_eq!(grad, vec![0.5, -2.0]);
        assert_eq!(hess, vec![1.0, 2.0]);
    }

    #[test]
    fn test_softmax_gradients_sum_to_zero() {
        let obj = Objective::Softmax { num_class: 3 };
        let mut grad = vec![0.0; 3];
        let mut hess = vec![0.0; 3];
        obj.gradients(&[0.2, -0.1, 0.4], &[2.0], &[1.0], &mut grad, &mut hess);
        assert!(grad.iter().sum::<f64>().abs() < 1e-12);
        assert!(grad[2] < 0.0);
        assert!(hess.iter().all(|h| *h > 0.0));
    }

    #[test]
    fn test_uniform_logloss() {
        let obj = Objective::Softmax { num_class: 3 };
        let loss = obj.evaluate(&[0.0; 6], &[0.0, 2.0]);
        assert!((loss - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_base_score() {
        let base = Objective::SquaredError.base_score(&[1.0, 4.0], &[3.0, 1.0]);
        assert!((base[0] - 1.75).abs() < 1e-12);
    }
}
