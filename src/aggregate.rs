//! Segment counts, per-segment statistics and chart-ready projections

use std::collections::BTreeMap;

use serde::Serialize;

use crate::segment::{Segment, SegmentedTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStats {
    pub count: usize,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub total_monetary: f64,
}

/// One treemap tile per segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreemapEntry {
    pub segment: Segment,
    pub customer_count: usize,
    pub total_value: f64,
    pub customer_percentage: f64,
    pub value_percentage: f64,
}

/// One polar-area wedge per segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarAreaEntry {
    pub segment: Segment,
    pub count: usize,
    pub percentage: f64,
}

/// Everything derivable from segmentation alone, without any model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    pub segment_counts: BTreeMap<Segment, usize>,
    pub segment_stats: BTreeMap<Segment, SegmentStats>,
    /// Ordered by segment
    pub treemap_data: Vec<TreemapEntry>,
    /// Ordered by count, largest first
    pub polar_area_data: Vec<PolarAreaEntry>,
}

impl SegmentReport {
    pub fn from_table(table: &SegmentedTable) -> Self {
        let segment_stats = segment_stats(table);
        let segment_counts = segment_stats
            .iter()
            .map(|(segment, stats)| (*segment, stats.count))
            .collect();

        Self {
            treemap_data: treemap_data(&segment_stats),
            polar_area_data: polar_area_data(&segment_stats),
            segment_counts,
            segment_stats,
        }
    }

    pub fn total_customers(&self) -> usize {
        self.segment_counts.values().sum()
    }
}

/// Percentage of `part` in `total`, rounded to one decimal
///
/// Exact halves round to the even digit, so 0.25% reports as 0.2.
pub fn percentage(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    (part / total * 1000.0).round_ties_even() / 10.0
}

fn segment_stats(table: &SegmentedTable) -> BTreeMap<Segment, SegmentStats> {
    #[derive(Default)]
    struct Totals {
        count: usize,
        recency: f64,
        frequency: f64,
        monetary: f64,
    }

    let mut totals: BTreeMap<Segment, Totals> = BTreeMap::new();
    for record in table.records() {
        let customer = &record.scored.customer;
        let entry = totals.entry(record.segment).or_default();
        entry.count += 1;
        entry.recency += customer.recency_days as f64;
        entry.frequency += customer.frequency;
        entry.monetary += customer.monetary;
    }

    totals
        .into_iter()
        .map(|(segment, t)| {
            let n = t.count as f64;
            let stats = SegmentStats {
                count: t.count,
                avg_recency: t.recency / n,
                avg_frequency: t.frequency / n,
                avg_monetary: t.monetary / n,
                total_monetary: t.monetary,
            };
            (segment, stats)
        })
        .collect()
}

fn treemap_data(stats: &BTreeMap<Segment, SegmentStats>) -> Vec<TreemapEntry> {
    let total_customers = stats.values().map(|s| s.count).sum::<usize>() as f64;
    let total_value: f64 = stats.values().map(|s| s.total_monetary).sum();

    stats
        .iter()
        .map(|(segment, s)| TreemapEntry {
            segment: *segment,
            customer_count: s.count,
            total_value: s.total_monetary,
            customer_percentage: percentage(s.count as f64, total_customers),
            value_percentage: percentage(s.total_monetary, total_value),
        })
        .collect()
}

fn polar_area_data(stats: &BTreeMap<Segment, SegmentStats>) -> Vec<PolarAreaEntry> {
    let total = stats.values().map(|s| s.count).sum::<usize>() as f64;

    let mut entries: Vec<PolarAreaEntry> = stats
        .iter()
        .map(|(segment, s)| PolarAreaEntry {
            segment: *segment,
            count: s.count,
            percentage: percentage(s.count as f64, total),
        })
        .collect();
    // stable sort keeps segment order among equal counts
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CustomerRecord, CustomerTable};
    use crate::scoring::score;
    use crate::segment::classify;

    fn reference_table() -> SegmentedTable {
        let rows = [
            (5, 20.0, 5000.0),
            (20, 10.0, 2500.0),
            (60, 5.0, 1000.0),
            (100, 3.0, 500.0),
            (150, 1.0, 100.0),
            (7, 18.0, 4200.0),
        ];
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, &(recency_days, frequency, monetary))| CustomerRecord {
                customer_id: format!("C{:03}", i + 1),
                recency_days,
                frequency,
                monetary,
            })
            .collect();
        classify(score(CustomerTable::from_records(records).unwrap()))
    }

    #[test]
    fn test_counts_cover_every_customer() {
        let report = SegmentReport::from_table(&reference_table());
        assert_eq!(report.total_customers(), 6);
        assert_eq!(
            report.segment_counts.values().sum::<usize>(),
            report.segment_stats.values().map(|s| s.count).sum::<usize>()
        );
    }

    #[test]
    fn test_segment_stats_means() {
        let report = SegmentReport::from_table(&reference_table());
        let champions = &report.segment_stats[&Segment::Champions];
        assert_eq!(champions.count, 2);
        assert_eq!(champions.avg_recency, 6.0);
        assert_eq!(champions.avg_frequency, 19.0);
        assert_eq!(champions.avg_monetary, 4600.0);
        assert_eq!(champions.total_monetary, 9200.0);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let report = SegmentReport::from_table(&reference_table());
        let n = report.treemap_data.len() as f64;

        let customer_pct: f64 = report.treemap_data.iter().map(|e| e.customer_percentage).sum();
        let value_pct: f64 = report.treemap_data.iter().map(|e| e.value_percentage).sum();
        let polar_pct: f64 = report.polar_area_data.iter().map(|e| e.percentage).sum();

        for total in [customer_pct, value_pct, polar_pct] {
            assert!((total - 100.0).abs() <= 0.1 * n, "total {total}");
        }
    }

    #[test]
    fn test_polar_area_sorted_by_count() {
        let report = SegmentReport::from_table(&reference_table());
        let counts: Vec<usize> = report.polar_area_data.iter().map(|e| e.count).collect();
        let mut sorted = counts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);
        assert_eq!(report.polar_area_data[0].segment, Segment::Champions);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1.0, 3.0), 33.3);
        assert_eq!(percentage(2.0, 3.0), 66.7);
        assert_eq!(percentage(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_percentage_halves_round_to_even() {
        assert_eq!(percentage(1.0, 400.0), 0.2);
        assert_eq!(percentage(3.0, 400.0), 0.8);
        assert_eq!(percentage(5.0, 400.0), 1.2);
        assert_eq!(percentage(1.0, 8.0), 12.5);
    }
}
