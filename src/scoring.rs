//! Quartile-based recency/frequency/monetary scoring

use serde::Serialize;

use crate::data::{CustomerRecord, CustomerTable};

/// Quantile cut points for four equal-frequency bins
const QUARTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// A customer with its batch-relative R, F and M scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub customer: CustomerRecord,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    /// `r * 100 + f * 10 + m`, for display and sorting only
    pub rfm_score: u16,
}

#[derive(Debug, Clone)]
pub struct ScoredTable {
    records: Vec<ScoredRecord>,
}

impl ScoredTable {
    pub fn records(&self) -> &[ScoredRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ScoredRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Composite score with hundreds = R, tens = F, units = M
pub fn composite_score(r: u8, f: u8, m: u8) -> u16 {
    r as u16 * 100 + f as u16 * 10 + m as u16
}

/// Score every customer against the quartiles of its own batch
///
/// Recency buckets are inverted (`4 - bucket`) so the most recent customers
/// score highest; frequency and monetary map as `bucket + 1`.
pub fn score(table: CustomerTable) -> ScoredTable {
    let customers = table.into_records();

    let recency: Vec<f64> = customers.iter().map(|c| c.recency_days as f64).collect();
    let frequency: Vec<f64> = customers.iter().map(|c| c.frequency).collect();
    let monetary: Vec<f64> = customers.iter().map(|c| c.monetary).collect();

    let r_buckets = quartile_buckets(&recency);
    let f_buckets = quartile_buckets(&frequency);
    let m_buckets = quartile_buckets(&monetary);

    let records: Vec<ScoredRecord> = customers
        .into_iter()
        .enumerate()
        .map(|(i, customer)| {
            let r_score = (4 - r_buckets[i]) as u8;
            let f_score = (f_buckets[i] + 1) as u8;
            let m_score = (m_buckets[i] + 1) as u8;
            ScoredRecord {
                customer,
                r_score,
                f_score,
                m_score,
                rfm_score: composite_score(r_score, f_score, m_score),
            }
        })
        .collect();

    tracing::debug!(customers = records.len(), "scored customers");
    ScoredTable { records }
}

/// Assign each value to one of up to four equal-frequency bins
///
/// Bin edges are the 0/25/50/75/100% quantiles (linear interpolation).
/// Duplicate edges are dropped and the surviving bins renumbered from 0, so
/// heavily duplicated columns produce fewer than four bins. Bins are
/// right-closed, with the lowest edge included in bin 0.
pub fn quartile_buckets(values: &[f64]) -> Vec<usize> {
    let edges = quantile_edges(values);
    let n_bins = edges.len().saturating_sub(1);
    if n_bins < 4 {
        tracing::warn!(bins = n_bins, "quartile binning collapsed duplicate edges");
    }

    values
        .iter()
        .map(|&value| {
            if n_bins == 0 {
                return 0;
            }
            let above = edges[1..].iter().filter(|&&edge| edge < value).count();
            above.min(n_bins - 1)
        })
        .collect()
}

/// Deduplicated quartile edges of `values`
pub fn quantile_edges(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut edges: Vec<f64> = QUARTILES.iter().map(|&q| quantile(&sorted, q)).collect();
    edges.dedup();
    edges
}

/// Linearly interpolated quantile of an already sorted slice
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn buckets_stay_within_four_levels(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)) {
            let buckets = quartile_buckets(&values);
            prop_assert_eq!(buckets.len(), values.len());
            prop_assert!(buckets.iter().all(|&b| b < 4));
        }

        #[test]
        fn buckets_preserve_order(values in prop::collection::vec(0u32..50, 1..100)) {
            let values: Vec<f64> = values.into_iter().map(f64::from).collect();
            let buckets = quartile_buckets(&values);
            for i in 0..values.len() {
                for j in 0..values.len() {
                    if values[i] < values[j] {
                        prop_assert!(buckets[i] <= buckets[j]);
                    }
                }
            }
        }
    }
}
