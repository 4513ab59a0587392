//! RfmForge: RFM segmentation and predictive analytics for customer tables
//!
//! A raw table flows through typed stages: preprocessing into a
//! [`CustomerTable`], quartile scoring into a [`ScoredTable`], rule-based
//! classification into a [`SegmentedTable`], and from there into the
//! aggregate [`SegmentReport`] and the lazily fitted [`PredictiveSuite`].
//! [`analyze`] runs all of it and returns a serialisable [`InsightBundle`].

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod insights;
pub mod pipeline;
pub mod predict;
pub mod scoring;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use aggregate::SegmentReport;
pub use cli::Args;
pub use config::{ColumnMapping, EngineConfig};
pub use data::{load_csv, preprocess, CustomerRecord, CustomerTable};
pub use error::{ModelFitError, ModelKind, RfmError, ValidationError};
pub use insights::Insights;
pub use pipeline::{analyze, segment, InsightBundle};
pub use predict::{PredictionRecord, PredictiveSuite};
pub use scoring::{score, ScoredTable};
pub use segment::{classify, Segment, SegmentedTable};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, RfmError>;
