//! Gradient-boosted regression trees (squared-error loss)

use ndarray::{Array1, Array2, ArrayView1};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Node::Leaf(value) => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

/// CART regression tree split on squared-error reduction
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl RegressionTree {
    /// Fit on the rows `indices` of `records`; squared-error reduction per
    /// feature is added to `gains`
    fn fit(
        records: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        params: &BoostingParams,
        gains: &mut [f64],
    ) -> Self {
        let root = Self::grow(records, targets, indices, 0, params, gains);
        Self { root }
    }

    fn grow(
        records: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        params: &BoostingParams,
        gains: &mut [f64],
    ) -> Node {
        let mean = indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64;
        if depth >= params.max_depth || indices.len() < 2 * params.min_samples_leaf.max(1) {
            return Node::Leaf(mean);
        }

        match Self::best_split(records, targets, indices, params) {
            Some(split) => {
                gains[split.feature] += split.gain;
                let left = Self::grow(records, targets, &split.left, depth + 1, params, gains);
                let right = Self::grow(records, targets, &split.right, depth + 1, params, gains);
                Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => Node::Leaf(mean),
        }
    }

    fn best_split(
        records: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        params: &BoostingParams,
    ) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| targets[i]).sum();
        let parent_score = total * total / n as f64;

        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..records.ncols() {
            sorted.sort_by(|&a, &b| records[[a, feature]].total_cmp(&records[[b, feature]]));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += targets[sorted[k - 1]];
                let lower = records[[sorted[k - 1], feature]];
                let upper = records[[sorted[k], feature]];
                if k < min_leaf || n - k < min_leaf || lower == upper {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / k as f64
                    + right_sum * right_sum / (n - k) as f64
                    - parent_score;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (lower + upper) / 2.0, gain));
                }
            }
        }

        let (feature, threshold, gain) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| records[[i, feature]] <= threshold);
        Some(BestSplit {
            feature,
            threshold,
            gain,
            left,
            right,
        })
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.root.predict(row)
    }
}

/// Additive ensemble of shallow regression trees fitted to residuals
#[derive(Debug, Clone)]
pub struct GradientBoostingRegressor {
    params: BoostingParams,
    base_score: f64,
    trees: Vec<RegressionTree>,
    feature_importance: Vec<f64>,
}

impl GradientBoostingRegressor {
    pub fn fit(records: &Array2<f64>, targets: &Array1<f64>, params: BoostingParams) -> Self {
        let n = records.nrows();
        let targets = targets.to_vec();
        let base_score = if n == 0 {
            0.0
        } else {
            targets.iter().sum::<f64>() / n as f64
        };

        let indices: Vec<usize> = (0..n).collect();
        let mut predictions = vec![base_score; n];
        let mut gains = vec![0.0; records.ncols()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        if n > 0 {
            for _ in 0..params.n_estimators {
                let residuals: Vec<f64> = targets
                    .iter()
                    .zip(&predictions)
                    .map(|(y, p)| y - p)
                    .collect();
                let tree = RegressionTree::fit(records, &residuals, &indices, &params, &mut gains);
                for (i, row) in records.outer_iter().enumerate() {
                    predictions[i] += params.learning_rate * tree.predict_row(row);
                }
                trees.push(tree);
            }
        }

        let total_gain: f64 = gains.iter().sum();
        let feature_importance = if total_gain > 0.0 {
            gains.iter().map(|g| g / total_gain).collect()
        } else {
            vec![0.0; gains.len()]
        };

        Self {
            params,
            base_score,
            trees,
            feature_importance,
        }
    }

    pub fn predict(&self, records: &Array2<f64>) -> Array1<f64> {
        records
            .outer_iter()
            .map(|row| {
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|tree| self.params.learning_rate * tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect()
    }

    /// Share of total squared-error reduction attributed to each feature
    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
