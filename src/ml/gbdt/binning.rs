use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-feature cut points learned from the training matrix.
///
/// A value `v` falls in bin `b` where `b` is the number of cuts strictly
/// below `v`, so `v <= cuts[b]` holds for every bin except the last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBins {
    cuts: Vec<Vec<f64>>,
}

impl FeatureBins {
    /// Quantile cut points with at most `max_bins` bins per feature
    pub fn fit(x: ArrayView2<f64>, max_bins: usize) -> Self {
        let cuts = (0..x.ncols())
            .into_par_iter()
            .map(|f| {
                let mut values: Vec<f64> =
                    x.column(f).iter().copied().filter(|v| v.is_finite()).collect();
                values.sort_by(f64::total_cmp);
                feature_cuts(&values, max_bins)
            })
            .collect();
        Self { cuts }
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    /// Raw-value threshold equivalent to "bin <= `bin`"
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.cuts[feature][bin]
    }

    pub fn bin(&self, feature: usize, value: f64) -> u8 {
        let cuts = &self.cuts[feature];
        // NaN compares false everywhere and lands in the last bin
        let idx = if value.is_nan() {
            cuts.len()
        } else {
            cuts.partition_point(|c| *c < value)
        };
        idx as u8
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> BinnedMatrix {
        let columns = (0..x.ncols())
            .into_par_iter()
            .map(|f| x.column(f).iter().map(|v| self.bin(f, *v)).collect())
            .collect();
        BinnedMatrix {
            n_rows: x.nrows(),
            columns,
        }
    }
}

fn feature_cuts(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let mut unique = sorted.to_vec();
    unique.dedup();
    if unique.len() <= 1 {
        return Vec::new();
    }

    // the maximum never needs a cut: everything is <= it
    let max = unique[unique.len() - 1];
    if unique.len() <= max_bins {
        unique.pop();
        return unique;
    }

    let n = sorted.len();
    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|i| sorted[(i * n / max_bins).min(n - 1)])
        .filter(|c| *c < max)
        .collect();
    cuts.dedup();
    cuts
}

/// Column-major matrix of bin indices
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    n_rows: usize,
    columns: Vec<Vec<u8>>,
}

impl BinnedMatrix {
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column(&self, feature: usize) -> &[u8] {
        &self.columns[feature]
    }

    pub fn get(&self, row: usize, feature: usize) -> u8 {
        self.columns[feature][row]
    }
}
