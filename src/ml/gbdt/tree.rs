use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::binning::{BinnedMatrix, FeatureBins};
use super::GbdtParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        bin: u8,
        gain: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Regression tree stored as a flat node arena; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Walk the tree reading feature values through `value`
    pub fn predict_with(&self, value: impl Fn(usize) -> f64) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if value(*feature) <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.predict_with(|f| row[f])
    }

    pub(crate) fn predict_binned(&self, binned: &BinnedMatrix, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    bin,
                    left,
                    right,
                    ..
                } => {
                    idx = if binned.get(row, *feature) <= *bin { *left } else { *right };
                }
            }
        }
    }

    /// Total split gain attributed to each feature
    pub fn accumulate_gain(&self, importance: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                importance[*feature] += gain;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Grows one tree greedily on gradient/hessian histograms
pub(crate) struct TreeBuilder<'a> {
    pub binned: &'a BinnedMatrix,
    pub bins: &'a FeatureBins,
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    pub features: &'a [usize],
    pub params: &'a GbdtParams,
}

impl<'a> TreeBuilder<'a> {
    pub fn build(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = Vec::new();
        self.grow(&mut nodes, rows, 0);
        Tree { nodes }
    }

    fn grow(&self, nodes: &mut Vec<Node>, rows: Vec<usize>, depth: usize) -> usize {
        let (g, h) = rows
            .iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.grad[r], h + self.hess[r]));

        let idx = nodes.len();
        nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let column = self.binned.column(split.feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| column[r] as usize <= split.bin);

        let left = self.grow(nodes, left_rows, depth + 1);
        let right = self.grow(nodes, right_rows, depth + 1);
        nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: self.bins.threshold(split.feature, split.bin),
            bin: split.bin as u8,
            gain: split.gain,
            left,
            right,
        };
        idx
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        // ties resolve to the earlier feature, reduce_with keeps order
        self.features
            .par_iter()
            .filter_map(|&f| self.best_split_for_feature(f, rows, g, h))
            .reduce_with(|a, b| if b.gain > a.gain { b } else { a })
    }

    fn best_split_for_feature(
        &self,
        feature: usize,
        rows: &[usize],
        g: f64,
        h: f64,
    ) -> Option<SplitCandidate> {
        let n_bins = self.bins.n_bins(feature);
        if n_bins < 2 {
            return None;
        }

        let column = self.binned.column(feature);
        let mut hist = vec![(0.0_f64, 0.0_f64); n_bins];
        for &r in rows {
            let slot = &mut hist[column[r] as usize];
            slot.0 += self.grad[r];
            slot.1 += self.hess[r];
        }

        let parent = self.score(g, h);
        let min_child = self.params.min_child_weight;
        let mut best: Option<SplitCandidate> = None;
        let (mut gl, mut hl) = (0.0, 0.0);

        for (bin, (bg, bh)) in hist.iter().enumerate().take(n_bins - 1) {
            gl += bg;
            hl += bh;
            let (gr, hr) = (g - gl, h - hl);
            if hl <= 0.0 || hr <= 0.0 || hl < min_child || hr < min_child {
                continue;
            }
            let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate { feature, bin, gain });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn params() -> GbdtParams {
        GbdtParams {
            learning_rate: 1.0,
            lambda: 0.0,
            min_child_weight: 0.0,
            max_depth: 3,
            ..GbdtParams::default()
        }
    }

    #[test]
    fn test_step_function_is_recovered() {
        // y = 0 for x < 5, y = 10 otherwise; gradients at margin 0 are -y
        let x = Array2::from_shape_vec((10, 1), (0..10).map(|i| i as f64).collect()).unwrap();
        let grad: Vec<f64> = (0..10).map(|i| if i < 5 { 0.0 } else { -10.0 }).collect();
        let hess = vec![1.0; 10];
        let bins = FeatureBins::fit(x.view(), 256);
        let binned = bins.transform(x.view());
        let params = params();
        let builder = TreeBuilder {
            binned: &binned,
            bins: &bins,
            grad: &grad,
            hess: &hess,
            features: &[0],
            params: &params,
        };
        let tree = builder.build((0..10).collect());

        match &tree.nodes()[0] {
            Node::Split { threshold, .. } => assert_eq!(*threshold, 4.0),
            other => panic!("expected split at root, got {:?}", other),
        }
        assert_eq!(tree.predict_row(&[2.0]), 0.0);
        assert_eq!(tree.predict_row(&[7.0]), 10.0);
        for r in 0..10 {
            assert_eq!(tree.predict_binned(&binned, r), tree.predict_row(&[r as f64]));
        }
    }

    #[test]
    fn test_depth_limit_and_pure_node() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let grad = vec![-1.0, -1.0, -1.0, -1.0];
        let hess = vec![1.0; 4];
        let bins = FeatureBins::fit(x.view(), 256);
        let binned = bins.transform(x.view());
        let params = params();
        let tree = TreeBuilder {
            binned: &binned,
            bins: &bins,
            grad: &grad,
            hess: &hess,
            features: &[0],
            params: &params,
        }
        .build((0..4).collect());
        // identical gradients give no positive gain, so the root stays a leaf
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_row(&[0.0]), 1.0);
    }

    #[test]
    fn test_tree_json_shape() {
        let tree = Tree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 1.5,
                    bin: 0,
                    gain: 2.0,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: -1.0 },
                Node::Leaf { value: 1.0 },
            ],
        };
        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"type\":\"split\""));
        let back: Tree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
        let mut importance = vec![0.0];
        tree.accumulate_gain(&mut importance);
        assert_eq!(importance[0], 2.0);
    }
}
