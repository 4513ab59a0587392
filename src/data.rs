//! Input table loading and per-customer preprocessing using Polars

use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::Serialize;

use crate::config::{ColumnMapping, EngineConfig};
use crate::error::{RfmError, ValidationError};

/// Datetime layouts accepted for string recency columns, tried in order
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// One customer after preprocessing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    /// Days between the last activity and the analysis date
    pub recency_days: i64,
    pub frequency: f64,
    pub monetary: f64,
}

/// Preprocessed customers of one analysis run
#[derive(Debug, Clone)]
pub struct CustomerTable {
    records: Vec<CustomerRecord>,
    dropped_rows: usize,
}

impl CustomerTable {
    /// Build a table from already-clean records
    pub fn from_records(records: Vec<CustomerRecord>) -> crate::Result<Self> {
        if records.is_empty() {
            return Err(ValidationError::EmptyTable.into());
        }
        Ok(Self {
            records,
            dropped_rows: 0,
        })
    }

    pub fn records(&self) -> &[CustomerRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CustomerRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Input rows discarded because a required field was missing or unparsable
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }
}

/// Load a CSV file into a DataFrame with Polars' lazy reader
///
/// Values are kept as inferred; date parsing and numeric coercion happen in
/// [`preprocess`].
pub fn load_csv(file_path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(RfmError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", file_path.display()),
        )));
    }

    let df = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .finish()?
        .collect()?;

    tracing::debug!(rows = df.height(), columns = df.width(), "loaded csv");
    Ok(df)
}

/// Clean the raw table into one record per row
///
/// # Arguments
/// * `df` - Raw customer table
/// * `columns` - Names of the id, recency, frequency and monetary columns
/// * `config` - Supplies the analysis date and the future-recency policy
///
/// # Returns
/// * `CustomerTable` with every row that had all four fields parseable
pub fn preprocess(
    df: &DataFrame,
    columns: &ColumnMapping,
    config: &EngineConfig,
) -> crate::Result<CustomerTable> {
    let missing: Vec<String> = columns
        .names()
        .iter()
        .filter(|name| df.column(name).is_err())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing).into());
    }

    let customer_ids = string_values(df.column(&columns.customer_id)?)?;
    let last_activity = date_values(df.column(&columns.recency)?)?;
    let frequency = numeric_values(df.column(&columns.frequency)?)?;
    let monetary = numeric_values(df.column(&columns.monetary)?)?;

    let as_of = config.analysis_date();
    let mut records = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        let (Some(customer_id), Some(date), Some(frequency), Some(monetary)) = (
            customer_ids[i].clone(),
            last_activity[i],
            frequency[i],
            monetary[i],
        ) else {
            continue;
        };

        let mut recency_days = (as_of - date).num_days();
        if config.clamp_future_recency {
            recency_days = recency_days.max(0);
        }

        records.push(CustomerRecord {
            customer_id,
            recency_days,
            frequency,
            monetary,
        });
    }

    let dropped_rows = df.height() - records.len();
    if dropped_rows > 0 {
        tracing::warn!(dropped_rows, "dropped rows with missing or unparsable fields");
    }

    if records.is_empty() {
        return Err(ValidationError::EmptyTable.into());
    }

    tracing::debug!(customers = records.len(), %as_of, "preprocessed customer table");

    Ok(CustomerTable {
        records,
        dropped_rows,
    })
}

fn string_values(series: &Series) -> crate::Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Coerce to f64; anything that does not parse becomes `None`
fn numeric_values(series: &Series) -> crate::Result<Vec<Option<f64>>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| v.is_finite()))
        .collect())
}

/// Read the recency column as calendar dates, whatever its physical type
fn date_values(series: &Series) -> crate::Result<Vec<Option<NaiveDate>>> {
    match series.dtype() {
        DataType::Date => {
            let days = series.cast(&DataType::Int32)?;
            Ok(days
                .i32()?
                .into_iter()
                .map(|value| value.and_then(date_from_epoch_days))
                .collect())
        }
        DataType::Datetime(unit, zone) => {
            let unit = *unit;
            let zone = ColumnZone::parse(zone.as_deref());
            let ticks = series.cast(&DataType::Int64)?;
            Ok(ticks
                .i64()?
                .into_iter()
                .map(|value| value.and_then(|v| date_from_timestamp(v, unit, zone)))
                .collect())
        }
        _ => {
            let text = series.cast(&DataType::String)?;
            Ok(text
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_date))
                .collect())
        }
    }
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(chrono::Duration::days(days as i64))
}

/// Zone whose wall clock decides the calendar date of a Datetime column
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnZone {
    Utc,
    Named(Tz),
    Fixed(FixedOffset),
}

impl ColumnZone {
    fn parse(zone: Option<&str>) -> Self {
        let Some(name) = zone else {
            return ColumnZone::Utc;
        };
        if let Ok(tz) = name.parse::<Tz>() {
            return ColumnZone::Named(tz);
        }
        if let Ok(offset) = name.parse::<FixedOffset>() {
            return ColumnZone::Fixed(offset);
        }
        tracing::warn!(zone = name, "unrecognised time zone on recency column, using UTC dates");
        ColumnZone::Utc
    }

    fn local_date(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            ColumnZone::Utc => instant.date_naive(),
            ColumnZone::Named(tz) => instant.with_timezone(&tz).date_naive(),
            ColumnZone::Fixed(offset) => instant.with_timezone(&offset).date_naive(),
        }
    }
}

/// Calendar date of a stored instant, read in the column's own zone
fn date_from_timestamp(value: i64, unit: TimeUnit, zone: ColumnZone) -> Option<NaiveDate> {
    let per_second: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let secs = value.div_euclid(per_second);
    let nanos = value.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(secs, nanos as u32).map(|dt| zone.local_date(dt))
}

/// Parse a textual timestamp into its calendar date
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}
