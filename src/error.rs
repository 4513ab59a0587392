//! Error types for the segmentation engine

use std::fmt;
use thiserror::Error;

/// Which predictive model failed to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Churn,
    Opportunity,
    Ltv,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Churn => write!(f, "churn"),
            ModelKind::Opportunity => write!(f, "opportunity"),
            ModelKind::Ltv => write!(f, "ltv"),
        }
    }
}

/// Input table problems, surfaced before any scoring happens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("no valid customer rows remain after preprocessing")]
    EmptyTable,
}

/// A predictive model could not be trained on the given table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{model} model could not be fitted: {reason}")]
pub struct ModelFitError {
    pub model: ModelKind,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RfmError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    ModelFit(#[from] ModelFitError),

    #[error("table error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RfmError {
    pub(crate) fn model_fit(model: ModelKind, reason: impl Into<String>) -> Self {
        RfmError::ModelFit(ModelFitError {
            model,
            reason: reason.into(),
        })
    }
}
