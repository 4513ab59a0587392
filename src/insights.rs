//! Cross-model insights: retention risk, upsell and cross-sell targets

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{CHURN_RISK_THRESHOLD, LOW_CHURN_THRESHOLD};
use crate::predict::churn::ChurnModel;
use crate::predict::ltv::LtvModel;
use crate::predict::opportunity::OpportunityModel;
use crate::segment::{Segment, SegmentedTable};

const RETENTION_RECOMMENDATIONS: [&str; 3] = [
    "Offer loyalty programs to high-value customers at risk of churning",
    "Run reactivation campaigns for hibernating customers with high potential LTV",
    "Create personalised offers for customers you can't afford to lose",
];

const UPSELL_RECOMMENDATIONS: [&str; 3] = [
    "Offer premium products to customers with high upsell potential",
    "Build special bundles for loyal customers with low monetary value",
    "Develop subscription programs to raise the value of frequent customers",
];

const CROSSSELL_RECOMMENDATIONS: [&str; 3] = [
    "Recommend complementary products to customers with high cross-sell potential",
    "Create product bundles for customers with frequent low-value purchases",
    "Offer discounts in unexplored categories to loyal customers",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentLtv {
    pub segment: Segment,
    pub mean_predicted_ltv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub high_value_at_risk_count: usize,
    pub upsell_targets_count: usize,
    pub crosssell_targets_count: usize,
    pub high_value_at_risk: Vec<String>,
    pub upsell_targets: Vec<String>,
    pub crosssell_targets: Vec<String>,
    /// Highest mean predicted LTV first
    pub segment_ltv_ranking: Vec<SegmentLtv>,
    pub retention_recommendations: Vec<String>,
    pub upsell_recommendations: Vec<String>,
    pub crosssell_recommendations: Vec<String>,
}

impl Insights {
    pub fn compose(
        table: &SegmentedTable,
        churn: &ChurnModel,
        opportunities: &OpportunityModel,
        ltv: &LtvModel,
    ) -> Self {
        let mut high_value_at_risk = Vec::new();
        let mut upsell_targets = Vec::new();
        let mut crosssell_targets = Vec::new();
        let mut ltv_by_segment: BTreeMap<Segment, (f64, usize)> = BTreeMap::new();

        for (i, record) in table.records().iter().enumerate() {
            let probability = churn.probabilities[i];
            let id = record.customer_id();

            if ltv.tiers[i].is_high_value() && probability > CHURN_RISK_THRESHOLD {
                high_value_at_risk.push(id.to_string());
            }
            if opportunities.upsell[i] && probability < LOW_CHURN_THRESHOLD {
                upsell_targets.push(id.to_string());
            }
            if opportunities.crosssell[i] && probability < LOW_CHURN_THRESHOLD {
                crosssell_targets.push(id.to_string());
            }

            let entry = ltv_by_segment.entry(record.segment).or_insert((0.0, 0));
            entry.0 += ltv.predicted[i];
            entry.1 += 1;
        }

        let mut segment_ltv_ranking: Vec<SegmentLtv> = ltv_by_segment
            .into_iter()
            .map(|(segment, (sum, count))| SegmentLtv {
                segment,
                mean_predicted_ltv: sum / count as f64,
            })
            .collect();
        segment_ltv_ranking.sort_by(|a, b| b.mean_predicted_ltv.total_cmp(&a.mean_predicted_ltv));

        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();

        Self {
            high_value_at_risk_count: high_value_at_risk.len(),
            upsell_targets_count: upsell_targets.len(),
            crosssell_targets_count: crosssell_targets.len(),
            high_value_at_risk,
            upsell_targets,
            crosssell_targets,
            segment_ltv_ranking,
            retention_recommendations: strings(&RETENTION_RECOMMENDATIONS),
            upsell_recommendations: strings(&UPSELL_RECOMMENDATIONS),
            crosssell_recommendations: strings(&CROSSSELL_RECOMMENDATIONS),
        }
    }
}
