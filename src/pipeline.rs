//! End-to-end analysis: raw table in, serialisable insight bundle out

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::aggregate::SegmentReport;
use crate::config::{ColumnMapping, EngineConfig};
use crate::data::preprocess;
use crate::insights::Insights;
use crate::predict::churn::ChurnReport;
use crate::predict::ltv::LtvReport;
use crate::predict::opportunity::OpportunityReport;
use crate::predict::{PredictionRecord, PredictiveSuite};
use crate::scoring::score;
use crate::segment::{classify, SegmentedTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictiveReport {
    pub churn: ChurnReport,
    pub upsell_crosssell: OpportunityReport,
    pub ltv: LtvReport,
    pub insights: Insights,
}

/// Result of one full analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightBundle {
    /// Caller-supplied business label, passed through untouched
    pub segment_type: String,
    pub as_of: NaiveDate,
    pub rfm_analysis: SegmentReport,
    pub predictive_analytics: PredictiveReport,
    pub customers: Vec<PredictionRecord>,
}

/// Preprocess, score and classify a raw table
pub fn segment(
    df: &DataFrame,
    columns: &ColumnMapping,
    config: &EngineConfig,
) -> crate::Result<SegmentedTable> {
    let customers = preprocess(df, columns, config)?;
    let table = classify(score(customers));
    tracing::debug!(
        customers = table.len(),
        segments = table.present_segments().len(),
        "segmented customers"
    );
    Ok(table)
}

/// Run the whole engine over `df`
///
/// Any model failure aborts the run; use [`segment`] and
/// [`SegmentReport::from_table`] directly to keep the segment report in that
/// case.
pub fn analyze(
    df: &DataFrame,
    columns: &ColumnMapping,
    segment_type: &str,
    config: &EngineConfig,
) -> crate::Result<InsightBundle> {
    // pin the date so every stage agrees even across midnight
    let config = config.clone().with_as_of(config.analysis_date());
    let table = segment(df, columns, &config)?;
    let rfm_analysis = SegmentReport::from_table(&table);

    let suite = PredictiveSuite::new(&table, &config);
    let insights = suite.insights()?;
    let predictive_analytics = PredictiveReport {
        churn: suite.churn()?.report.clone(),
        upsell_crosssell: suite.opportunities()?.report.clone(),
        ltv: suite.ltv()?.report.clone(),
        insights,
    };

    tracing::info!(
        customers = table.len(),
        fits = suite.fit_count(),
        segment_type,
        "analysis complete"
    );

    Ok(InsightBundle {
        segment_type: segment_type.to_string(),
        as_of: config.analysis_date(),
        rfm_analysis,
        predictive_analytics,
        customers: suite.predictions(),
    })
}
