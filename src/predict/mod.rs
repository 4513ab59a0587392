//! Predictive analytics over a segmented customer table
//!
//! Three independent models share one run context: a churn classifier, an
//! opportunity clusterer and an LTV regressor. Each is fitted at most once per
//! [`PredictiveSuite`], on first use, and its state is reused afterwards.

pub mod boosting;
pub mod churn;
pub mod features;
pub mod ltv;
pub mod metrics;
pub mod opportunity;

use std::cell::{Cell, OnceCell};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::ModelKind;
use crate::insights::Insights;
use crate::segment::{SegmentedRecord, SegmentedTable};
use churn::ChurnModel;
use features::FeatureMatrix;
use ltv::{LtvModel, LtvTier};
use opportunity::OpportunityModel;

/// A customer row with whatever model outputs have been computed so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub segmented: SegmentedRecord,
    pub churn_probability: Option<f64>,
    pub cluster: Option<usize>,
    pub upsell_potential: Option<bool>,
    pub crosssell_potential: Option<bool>,
    pub predicted_ltv: Option<f64>,
    pub ltv_segment: Option<LtvTier>,
}

/// Run context holding the feature matrix and the lazily fitted models
#[derive(Debug)]
pub struct PredictiveSuite<'a> {
    table: &'a SegmentedTable,
    config: EngineConfig,
    features: FeatureMatrix,
    churn: OnceCell<ChurnModel>,
    opportunities: OnceCell<OpportunityModel>,
    ltv: OnceCell<LtvModel>,
    fits: Cell<usize>,
}

impl<'a> PredictiveSuite<'a> {
    pub fn new(table: &'a SegmentedTable, config: &EngineConfig) -> Self {
        let features = FeatureMatrix::from_table(table);
        tracing::debug!(
            customers = table.len(),
            features = features.names.len(),
            "built feature matrix"
        );
        Self {
            table,
            config: config.clone(),
            features,
            churn: OnceCell::new(),
            opportunities: OnceCell::new(),
            ltv: OnceCell::new(),
            fits: Cell::new(0),
        }
    }

    pub fn table(&self) -> &'a SegmentedTable {
        self.table
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn churn(&self) -> crate::Result<&ChurnModel> {
        if let Some(model) = self.churn.get() {
            return Ok(model);
        }
        let model = ChurnModel::fit(self.table, &self.features, &self.config)?;
        self.record_fit(ModelKind::Churn);
        Ok(self.churn.get_or_init(|| model))
    }

    pub fn opportunities(&self) -> crate::Result<&OpportunityModel> {
        if let Some(model) = self.opportunities.get() {
            return Ok(model);
        }
        let model = OpportunityModel::fit(self.table, &self.config)?;
        self.record_fit(ModelKind::Opportunity);
        Ok(self.opportunities.get_or_init(|| model))
    }

    pub fn ltv(&self) -> crate::Result<&LtvModel> {
        if let Some(model) = self.ltv.get() {
            return Ok(model);
        }
        let model = LtvModel::fit(self.table, &self.features, &self.config)?;
        self.record_fit(ModelKind::Ltv);
        Ok(self.ltv.get_or_init(|| model))
    }

    /// Combine all three models, fitting any that have not run yet
    pub fn insights(&self) -> crate::Result<Insights> {
        let churn = self.churn()?;
        let opportunities = self.opportunities()?;
        let ltv = self.ltv()?;
        Ok(Insights::compose(self.table, churn, opportunities, ltv))
    }

    /// Per-customer rows; columns of models that have not run are `None`
    pub fn predictions(&self) -> Vec<PredictionRecord> {
        let churn = self.churn.get();
        let opportunities = self.opportunities.get();
        let ltv = self.ltv.get();

        self.table
            .records()
            .iter()
            .enumerate()
            .map(|(i, record)| PredictionRecord {
                segmented: record.clone(),
                churn_probability: churn.map(|m| m.probabilities[i]),
                cluster: opportunities.map(|m| m.clusters[i]),
                upsell_potential: opportunities.map(|m| m.upsell[i]),
                crosssell_potential: opportunities.map(|m| m.crosssell[i]),
                predicted_ltv: ltv.map(|m| m.predicted[i]),
                ltv_segment: ltv.map(|m| m.tiers[i]),
            })
            .collect()
    }

    /// Number of model fits performed by this suite
    pub fn fit_count(&self) -> usize {
        self.fits.get()
    }

    pub fn has_run(&self, model: ModelKind) -> bool {
        match model {
            ModelKind::Churn => self.churn.get().is_some(),
            ModelKind::Opportunity => self.opportunities.get().is_some(),
            ModelKind::Ltv => self.ltv.get().is_some(),
        }
    }

    fn record_fit(&self, model: ModelKind) {
        self.fits.set(self.fits.get() + 1);
        tracing::debug!(%model, fits = self.fits.get(), "model fitted");
    }
}
