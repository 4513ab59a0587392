//! Churn classification with bagged decision trees

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa::Dataset;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::features::{train_test_split, FeatureMatrix};
use super::metrics::ClassificationMetrics;
use crate::config::EngineConfig;
use crate::error::{ModelKind, RfmError};
use crate::segment::{SegmentedRecord, SegmentedTable};

/// Heuristic churn label: low recency score and low frequency score
pub fn is_churned(record: &SegmentedRecord) -> bool {
    record.scored.r_score <= 2 && record.scored.f_score <= 2
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaggingParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

/// Decision trees fitted on bootstrap resamples; class probability is the
/// share of trees voting for it
///
/// Every tree considers every feature at every split. Only the rows are
/// resampled, so this is plain bagging rather than a random forest.
#[derive(Debug)]
pub struct BaggedTreeClassifier {
    trees: Vec<DecisionTree<f64, usize>>,
    n_features: usize,
}

impl BaggedTreeClassifier {
    pub fn fit(
        records: &Array2<f64>,
        labels: &Array1<usize>,
        params: &BaggingParams,
    ) -> crate::Result<Self> {
        let n_samples = records.nrows();
        if n_samples == 0 || params.n_estimators == 0 {
            return Err(RfmError::model_fit(
                ModelKind::Churn,
                "bagging needs at least one sample and one tree",
            ));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let dataset = Dataset::new(
                records.select(Axis(0), &sample),
                labels.select(Axis(0), &sample),
            );

            let tree = DecisionTree::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(params.max_depth)
                .fit(&dataset)
                .map_err(|e| RfmError::model_fit(ModelKind::Churn, e.to_string()))?;
            trees.push(tree);
        }

        Ok(Self {
            trees,
            n_features: records.ncols(),
        })
    }

    /// Probability of class 1 for every row
    pub fn predict_proba(&self, records: &Array2<f64>) -> Array1<f64> {
        let mut votes = Array1::<f64>::zeros(records.nrows());
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(records);
            votes
                .iter_mut()
                .zip(predicted.iter())
                .for_each(|(v, &class)| *v += (class == 1) as u8 as f64);
        }
        votes / self.trees.len() as f64
    }

    /// Mean impurity decrease per feature, averaged over the trees
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut importance = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (total, value) in importance.iter_mut().zip(tree.feature_importance()) {
                if value.is_finite() {
                    *total += value;
                }
            }
        }
        let n_trees = self.trees.len() as f64;
        importance.iter_mut().for_each(|v| *v /= n_trees);
        importance
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnPrediction {
    pub customer_id: String,
    pub churn_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnReport {
    pub metrics: ClassificationMetrics,
    pub feature_importance: BTreeMap<String, f64>,
    pub predictions: Vec<ChurnPrediction>,
}

/// Fitted churn ensemble with the probabilities it assigned to every customer
#[derive(Debug)]
pub struct ChurnModel {
    pub ensemble: BaggedTreeClassifier,
    pub report: ChurnReport,
    /// One per customer, in table order
    pub probabilities: Vec<f64>,
}

impl ChurnModel {
    /// Train on the held-in split, evaluate on the held-out split, then
    /// score the whole population (training rows included)
    pub fn fit(
        table: &SegmentedTable,
        features: &FeatureMatrix,
        config: &EngineConfig,
    ) -> crate::Result<Self> {
        let labels: Array1<usize> = table
            .records()
            .iter()
            .map(|record| is_churned(record) as usize)
            .collect();

        let split = train_test_split(features.nrows(), config.test_size, config.seed)
            .ok_or_else(|| {
                RfmError::model_fit(
                    ModelKind::Churn,
                    format!("cannot split {} customers into train and test sets", features.nrows()),
                )
            })?;

        let train_labels = labels.select(Axis(0), &split.train);
        let churned = train_labels.iter().filter(|&&l| l == 1).count();
        if churned == 0 || churned == train_labels.len() {
            return Err(RfmError::model_fit(
                ModelKind::Churn,
                "training split contains a single class",
            ));
        }

        let params = BaggingParams {
            n_estimators: config.n_estimators,
            max_depth: config.tree_max_depth,
            seed: config.seed,
        };
        let ensemble = BaggedTreeClassifier::fit(&features.rows(&split.train), &train_labels, &params)?;

        let test_scores = ensemble.predict_proba(&features.rows(&split.test)).to_vec();
        let y_true: Vec<bool> = split.test.iter().map(|&i| labels[i] == 1).collect();
        let y_pred: Vec<bool> = test_scores.iter().map(|&p| p > 0.5).collect();
        let metrics = ClassificationMetrics::evaluate(&y_true, &y_pred, &test_scores);

        let feature_importance = features
            .names
            .iter()
            .cloned()
            .zip(ensemble.feature_importance())
            .collect();

        let probabilities = ensemble.predict_proba(&features.records).to_vec();
        let predictions = table
            .records()
            .iter()
            .zip(&probabilities)
            .map(|(record, &churn_probability)| ChurnPrediction {
                customer_id: record.customer_id().to_string(),
                churn_probability,
            })
            .collect();

        tracing::info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            auc = ?metrics.auc,
            "fitted churn model"
        );

        Ok(Self {
            ensemble,
            report: ChurnReport {
                metrics,
                feature_importance,
                predictions,
            },
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::fixtures::{synthetic_table, uniform_recency_table};
    use ndarray::array;

    #[test]
    fn test_bagging_separates_obvious_classes() {
        let records = array![[0.0], [0.1], [0.2], [0.3], [5.0], [5.1], [5.2], [5.3]];
        let labels = array![0, 0, 0, 0, 1, 1, 1, 1];
        let params = BaggingParams {
            n_estimators: 25,
            max_depth: None,
            seed: 7,
        };

        let ensemble = BaggedTreeClassifier::fit(&records, &labels, &params).unwrap();
        assert_eq!(ensemble.n_trees(), 25);

        let proba = ensemble.predict_proba(&array![[0.05], [5.25]]);
        assert!(proba[0] < 0.5);
        assert!(proba[1] > 0.5);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_every_tree_sees_every_feature() {
        // only the last column separates the classes; the others are constant
        let records = array![
            [1.0, 3.0, 0.0],
            [1.0, 3.0, 0.2],
            [1.0, 3.0, 0.4],
            [1.0, 3.0, 0.6],
            [1.0, 3.0, 0.8],
            [1.0, 3.0, 1.0],
            [1.0, 3.0, 5.0],
            [1.0, 3.0, 5.2],
            [1.0, 3.0, 5.4],
            [1.0, 3.0, 5.6],
            [1.0, 3.0, 5.8],
            [1.0, 3.0, 6.0]
        ];
        let labels = array![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let params = BaggingParams {
            n_estimators: 30,
            max_depth: None,
            seed: 11,
        };

        let ensemble = BaggedTreeClassifier::fit(&records, &labels, &params).unwrap();
        let importance = ensemble.feature_importance();
        assert_eq!(importance.len(), 3);
        assert_eq!(importance[0], 0.0);
        assert_eq!(importance[1], 0.0);
        assert!(importance[2] > 0.9, "importance {importance:?}");

        // trees limited to the constant columns could not separate these rows
        let proba = ensemble.predict_proba(&array![[1.0, 3.0, 0.1], [1.0, 3.0, 5.9]]);
        assert!(proba[0] < 0.2 && proba[1] > 0.8, "proba {proba:?}");
    }

    #[test]
    fn test_churn_model_scores_every_customer() {
        let table = synthetic_table(40);
        let features = FeatureMatrix::from_table(&table);
        let model = ChurnModel::fit(&table, &features, &EngineConfig::default()).unwrap();

        assert_eq!(model.probabilities.len(), 40);
        assert_eq!(model.report.predictions.len(), 40);
        assert!(model
            .probabilities
            .iter()
            .all(|p| p.is_finite() && (0.0..=1.0).contains(p)));

        let metrics = &model.report.metrics;
        for value in [metrics.accuracy, metrics.precision, metrics.recall, metrics.f1] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert_eq!(model.report.feature_importance.len(), features.names.len());
    }

    #[test]
    fn test_churn_model_is_reproducible() {
        let table = synthetic_table(40);
        let features = FeatureMatrix::from_table(&table);
        let config = EngineConfig::default();

        let a = ChurnModel::fit(&table, &features, &config).unwrap();
        let b = ChurnModel::fit(&table, &features, &config).unwrap();
        assert_eq!(a.probabilities, b.probabilities);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn test_single_class_is_a_fit_error() {
        // identical recency puts everyone in r_score 4, so nobody is churned
        let table = uniform_recency_table(20);
        let features = FeatureMatrix::from_table(&table);

        let err = ChurnModel::fit(&table, &features, &EngineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RfmError::ModelFit(crate::error::ModelFitError {
                model: ModelKind::Churn,
                ..
            })
        ));
    }
}
