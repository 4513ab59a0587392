//! Engine configuration and column mapping

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Churn probability above which a high-LTV customer counts as at risk
pub const CHURN_RISK_THRESHOLD: f64 = 0.5;

/// Churn probability below which a customer is a safe upsell/cross-sell target
pub const LOW_CHURN_THRESHOLD: f64 = 0.3;

/// Names of the four input columns the engine reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub customer_id: String,
    pub recency: String,
    pub frequency: String,
    pub monetary: String,
}

impl ColumnMapping {
    pub fn new(
        customer_id: impl Into<String>,
        recency: impl Into<String>,
        frequency: impl Into<String>,
        monetary: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            recency: recency.into(),
            frequency: frequency.into(),
            monetary: monetary.into(),
        }
    }

    /// Column names in mapping order: id, recency, frequency, monetary
    pub fn names(&self) -> [&str; 4] {
        [
            &self.customer_id,
            &self.recency,
            &self.frequency,
            &self.monetary,
        ]
    }
}

/// Tunables for one analysis run
///
/// Every field has a working default, so
/// `EngineConfig::default()` is the normal starting point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Analysis date used for recency; `None` means today (local time)
    pub as_of: Option<NaiveDate>,
    /// Clamp negative recency (future timestamps) to zero
    pub clamp_future_recency: bool,
    /// Seed shared by the train/test split and every model
    pub seed: u64,
    /// Held-out fraction for churn and LTV evaluation
    pub test_size: f64,
    /// Trees in the churn ensemble and boosting rounds for LTV
    pub n_estimators: usize,
    /// Depth limit for churn trees (`None` grows until pure)
    pub tree_max_depth: Option<usize>,
    pub boosting_learning_rate: f64,
    pub boosting_max_depth: usize,
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub kmeans_max_iters: u64,
    pub kmeans_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            as_of: None,
            clamp_future_recency: false,
            seed: 42,
            test_size: 0.3,
            n_estimators: 100,
            tree_max_depth: None,
            boosting_learning_rate: 0.1,
            boosting_max_depth: 3,
            min_clusters: 2,
            max_clusters: 7,
            kmeans_max_iters: 300,
            kmeans_tolerance: 1e-4,
        }
    }
}

impl EngineConfig {
    /// The analysis date, falling back to today's local date
    pub fn analysis_date(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.test_size, 0.3);
        assert_eq!((config.min_clusters, config.max_clusters), (2, 7));
        assert!(!config.clamp_future_recency);
    }

    #[test]
    fn test_analysis_date_prefers_explicit_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let config = EngineConfig::default().with_as_of(date);
        assert_eq!(config.analysis_date(), date);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.n_estimators, 100);
    }
}
