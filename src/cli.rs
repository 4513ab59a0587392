//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

use crate::config::{ColumnMapping, EngineConfig};

/// RFM segmentation and predictive analytics for customer tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Column holding the customer identifier
    #[arg(long, default_value = "customer_id")]
    pub id_column: String,

    /// Column holding the date of the last purchase or activity
    #[arg(long, default_value = "last_purchase")]
    pub recency_column: String,

    /// Column holding the number of purchases
    #[arg(long, default_value = "frequency")]
    pub frequency_column: String,

    /// Column holding the total amount spent
    #[arg(long, default_value = "monetary")]
    pub monetary_column: String,

    /// Business label copied into the result (e.g. ecommerce, subscription)
    #[arg(short, long, default_value = "general")]
    pub segment_type: String,

    /// Analysis date as YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub as_of: Option<String>,

    /// Clamp recency of future-dated activity to zero days
    #[arg(long)]
    pub clamp_future: bool,

    /// Seed for the train/test split and every model
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Write the JSON result here instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Base path for PNG charts; `_segments.png` and `_clusters.png` are derived from it
    #[arg(short, long)]
    pub plot: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the analysis date
    /// Expected format: "YYYY-MM-DD"
    pub fn parse_as_of(&self) -> anyhow::Result<Option<NaiveDate>> {
        match self.as_of {
            Some(ref value) => {
                let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                    .map_err(|_| anyhow::anyhow!("Invalid --as-of date: {}", value))?;
                Ok(Some(date))
            }
            None => Ok(None),
        }
    }

    pub fn columns(&self) -> ColumnMapping {
        ColumnMapping::new(
            &self.id_column,
            &self.recency_column,
            &self.frequency_column,
            &self.monetary_column,
        )
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        Ok(EngineConfig {
            as_of: self.parse_as_of()?,
            clamp_future_recency: self.clamp_future,
            seed: self.seed,
            ..EngineConfig::default()
        })
    }
}
