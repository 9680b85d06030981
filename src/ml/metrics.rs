use serde::{Deserialize, Serialize};

use super::features::Direction;

/// Held-out evaluation of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationMetrics {
    Regression(RegressionMetrics),
    Classification(ClassificationMetrics),
}

impl EvaluationMetrics {
    /// One-line summary for logs
    pub fn headline(&self) -> String {
        match self {
            EvaluationMetrics::Regression(m) => format!(
                "RMSE {:.6}, MAE {:.6}, directional accuracy {:.1}%",
                m.rmse,
                m.mae,
                m.directional_accuracy * 100.0
            ),
            EvaluationMetrics::Classification(m) => format!(
                "accuracy {:.1}%, macro F1 {:.3}",
                m.accuracy * 100.0,
                m.macro_f1
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    /// Share of rows where prediction and outcome have the same sign
    pub directional_accuracy: f64,
    pub samples: usize,
}

pub fn regression_metrics(predicted: &[f64], actual: &[f64]) -> RegressionMetrics {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return RegressionMetrics {
            rmse: f64::NAN,
            mae: f64::NAN,
            directional_accuracy: f64::NAN,
            samples: 0,
        };
    }

    let mut sse = 0.0;
    let mut sae = 0.0;
    let mut same_sign = 0;
    for (p, a) in predicted.iter().zip(actual) {
        let err = p - a;
        sse += err * err;
        sae += err.abs();
        if (*p > 0.0) == (*a > 0.0) {
            same_sign += 1;
        }
    }

    RegressionMetrics {
        rmse: (sse / n as f64).sqrt(),
        mae: sae / n as f64,
        directional_accuracy: same_sign as f64 / n as f64,
        samples: n,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub class: Direction,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    /// `confusion[actual][predicted]`
    pub confusion: [[usize; 3]; 3],
    pub per_class: Vec<ClassReport>,
    pub samples: usize,
}

pub fn classification_metrics(predicted: &[f64], actual: &[f64]) -> ClassificationMetrics {
    let mut confusion = [[0usize; 3]; 3];
    for (p, a) in predicted.iter().zip(actual) {
        let (p, a) = (*p as usize, *a as usize);
        if p < 3 && a < 3 {
            confusion[a][p] += 1;
        }
    }

    let samples: usize = confusion.iter().flatten().sum();
    let correct: usize = (0..3).map(|c| confusion[c][c]).sum();

    let per_class: Vec<ClassReport> = Direction::ALL
        .iter()
        .enumerate()
        .map(|(c, class)| {
            let tp = confusion[c][c] as f64;
            let predicted_c: usize = (0..3).map(|a| confusion[a][c]).sum();
            let support: usize = confusion[c].iter().sum();
            let precision = ratio(tp, predicted_c as f64);
            let recall = ratio(tp, support as f64);
            ClassReport {
                class: *class,
                precision,
                recall,
                f1: ratio(2.0 * precision * recall, precision + recall),
                support,
            }
        })
        .collect();

    ClassificationMetrics {
        accuracy: ratio(correct as f64, samples as f64),
        macro_f1: per_class.iter().map(|r| r.f1).sum::<f64>() / 3.0,
        confusion,
        per_class,
        samples,
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regression_metrics() {
        let m = regression_metrics(&[0.01, -0.02, 0.03], &[0.02, -0.01, -0.01]);
        assert!((m.mae - (0.01 + 0.01 + 0.04) / 3.0).abs() < 1e-12);
        assert!((m.rmse - ((0.0001 + 0.0001 + 0.0016) / 3.0_f64).sqrt()).abs() < 1e-12);
        assert!((m.directional_accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.samples, 3);
    }

    #[test]
    fn test_classification_metrics() {
        let actual = [0.0, 0.0, 1.0, 2.0, 2.0, 2.0];
        let predicted = [0.0, 1.0, 1.0, 2.0, 2.0, 0.0];
        let m = classification_metrics(&predicted, &actual);
        assert_eq!(m.samples, 6);
        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(m.confusion[2][0], 1);
        let up = &m.per_class[2];
        assert_eq!(up.class, Direction::Up);
        assert_eq!(up.precision, 1.0);
        assert!((up.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(up.support, 3);
    }

    #[test]
    fn test_metrics_serialize_with_kind() {
        let m = EvaluationMetrics::Regression(regression_metrics(&[1.0], &[1.0]));
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"kind\":\"regression\""));
        assert!(m.headline().starts_with("RMSE 0.000000"));
    }
}
