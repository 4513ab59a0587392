//! Lifetime-value regression on historical spend

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array1;
use serde::Serialize;

use super::boosting::{BoostingParams, GradientBoostingRegressor};
use super::features::{train_test_split, FeatureMatrix};
use super::metrics::RegressionMetrics;
use crate::config::EngineConfig;
use crate::error::{ModelKind, RfmError};
use crate::scoring::quartile_buckets;
use crate::segment::SegmentedTable;

/// Ordinal lifetime-value tier from the quartiles of predicted LTV
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LtvTier {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl LtvTier {
    const ORDERED: [LtvTier; 4] = [LtvTier::Low, LtvTier::Medium, LtvTier::High, LtvTier::VeryHigh];

    /// Tier for a quartile bucket index, counted from `Low`
    pub fn from_bucket(bucket: usize) -> Self {
        Self::ORDERED[bucket.min(3)]
    }

    pub fn is_high_value(&self) -> bool {
        matches!(self, LtvTier::High | LtvTier::VeryHigh)
    }
}

impl fmt::Display for LtvTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LtvTier::Low => "Low",
            LtvTier::Medium => "Medium",
            LtvTier::High => "High",
            LtvTier::VeryHigh => "Very High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LtvReport {
    pub metrics: RegressionMetrics,
    pub feature_importance: BTreeMap<String, f64>,
    pub ltv_segments: BTreeMap<LtvTier, usize>,
}

#[derive(Debug, Clone)]
pub struct LtvModel {
    pub regressor: GradientBoostingRegressor,
    pub report: LtvReport,
    /// One per customer, in table order
    pub predicted: Vec<f64>,
    pub tiers: Vec<LtvTier>,
}

impl LtvModel {
    /// Regress raw monetary spend on the churn feature set, evaluate on the
    /// held-out rows, then predict and tier every customer
    pub fn fit(
        table: &SegmentedTable,
        features: &FeatureMatrix,
        config: &EngineConfig,
    ) -> crate::Result<Self> {
        let target: Array1<f64> = table
            .records()
            .iter()
            .map(|record| record.scored.customer.monetary)
            .collect();

        let split = train_test_split(features.nrows(), config.test_size, config.seed)
            .ok_or_else(|| {
                RfmError::model_fit(
                    ModelKind::Ltv,
                    format!("cannot split {} customers into train and test sets", features.nrows()),
                )
            })?;

        let params = BoostingParams {
            n_estimators: config.n_estimators,
            learning_rate: config.boosting_learning_rate,
            max_depth: config.boosting_max_depth,
            min_samples_leaf: 1,
        };
        let train_target: Array1<f64> = split.train.iter().map(|&i| target[i]).collect();
        let regressor = GradientBoostingRegressor::fit(&features.rows(&split.train), &train_target, params);

        let y_true: Vec<f64> = split.test.iter().map(|&i| target[i]).collect();
        let y_pred = regressor.predict(&features.rows(&split.test)).to_vec();
        let metrics = RegressionMetrics::evaluate(&y_true, &y_pred);

        let predicted = regressor.predict(&features.records).to_vec();
        if predicted.iter().any(|p| !p.is_finite()) {
            return Err(RfmError::model_fit(ModelKind::Ltv, "non-finite prediction"));
        }

        let tiers: Vec<LtvTier> = quartile_buckets(&predicted)
            .into_iter()
            .map(LtvTier::from_bucket)
            .collect();

        let mut ltv_segments = BTreeMap::new();
        for tier in &tiers {
            *ltv_segments.entry(*tier).or_insert(0) += 1;
        }

        let feature_importance = features
            .names
            .iter()
            .cloned()
            .zip(regressor.feature_importance().iter().copied())
            .collect();

        tracing::info!(rmse = metrics.rmse, r2 = metrics.r2, "fitted ltv model");

        Ok(Self {
            regressor,
            report: LtvReport {
                metrics,
                feature_importance,
                ltv_segments,
            },
            predicted,
            tiers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::fixtures::synthetic_table;

    #[test]
    fn test_tier_from_bucket() {
        assert_eq!(LtvTier::from_bucket(0), LtvTier::Low);
        assert_eq!(LtvTier::from_bucket(3), LtvTier::VeryHigh);
        assert!(LtvTier::High.is_high_value());
        assert!(!LtvTier::Medium.is_high_value());
        assert_eq!(LtvTier::VeryHigh.to_string(), "Very High");
        assert_eq!(serde_json::to_string(&LtvTier::VeryHigh).unwrap(), "\"Very High\"");
    }

    #[test]
    fn test_ltv_model_predicts_every_customer() {
        let table = synthetic_table(40);
        let features = FeatureMatrix::from_table(&table);
        let model = LtvModel::fit(&table, &features, &EngineConfig::default()).unwrap();

        assert_eq!(model.predicted.len(), 40);
        assert_eq!(model.tiers.len(), 40);
        assert!(model.predicted.iter().all(|p| p.is_finite()));
        assert_eq!(model.report.ltv_segments.values().sum::<usize>(), 40);

        let metrics = &model.report.metrics;
        assert!(metrics.mse >= 0.0);
        assert!((metrics.rmse - metrics.mse.sqrt()).abs() < 1e-9);
        assert!(metrics.mae >= 0.0);
    }

    #[test]
    fn test_higher_prediction_never_gets_lower_tier() {
        let table = synthetic_table(40);
        let features = FeatureMatrix::from_table(&table);
        let model = LtvModel::fit(&table, &features, &EngineConfig::default()).unwrap();

        for i in 0..40 {
            for j in 0..40 {
                if model.predicted[i] < model.predicted[j] {
                    assert!(model.tiers[i] <= model.tiers[j]);
                }
            }
        }
    }

    #[test]
    fn test_ltv_is_reproducible() {
        let table = synthetic_table(40);
        let features = FeatureMatrix::from_table(&table);
        let config = EngineConfig::default();

        let a = LtvModel::fit(&table, &features, &config).unwrap();
        let b = LtvModel::fit(&table, &features, &config).unwrap();
        assert_eq!(a.predicted, b.predicted);
        assert_eq!(a.tiers, b.tiers);
    }
}
