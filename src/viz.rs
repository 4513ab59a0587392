//! Chart rendering with Plotters for segment and cluster views

use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::aggregate::SegmentReport;
use crate::predict::PredictionRecord;

/// Color palette for clusters and segment bars
const PALETTE: [RGBColor; 7] = [
    RED,
    BLUE,
    GREEN,
    RGBColor(230, 159, 0),
    MAGENTA,
    CYAN,
    RGBColor(120, 120, 120),
];

pub fn palette_color(index: usize) -> RGBColor {
    PALETTE[index % PALETTE.len()]
}

/// Min/max of `values` widened by `padding` of the span on each side
///
/// Empty input gives `(0, 1)`; a zero span is widened by 1 either way.
pub fn padded_bounds(values: &[f64], padding: f64) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let span = max - min;
    if span == 0.0 {
        return (min - 1.0, max + 1.0);
    }
    (min - span * padding, max + span * padding)
}

/// `plot.png` + `segments` -> `plot_segments.png`
pub fn derived_path(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rfm".to_string());
    base.with_file_name(format!("{stem}_{suffix}.png"))
}

/// Bar chart of customers per segment, largest first
pub fn create_segment_chart(report: &SegmentReport, output_path: &Path) -> anyhow::Result<()> {
    let entries = &report.polar_area_data;
    let max_count = entries.iter().map(|e| e.count).max().unwrap_or(1) as f64;

    let root = BitMapBackend::new(output_path, (900, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..entries.len().max(1) as f64, 0f64..max_count * 1.1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(entries.len().max(1))
        .x_label_formatter(&|x| {
            entries
                .get(x.floor() as usize)
                .map(|e| e.segment.label().to_string())
                .unwrap_or_default()
        })
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(entries.iter().enumerate().map(|(i, entry)| {
        Rectangle::new(
            [(i as f64 + 0.1, 0.0), (i as f64 + 0.9, entry.count as f64)],
            palette_color(i).filled(),
        )
    }))?;

    root.present()?;
    tracing::info!(path = %output_path.display(), "segment chart saved");
    Ok(())
}

/// Scatter of frequency against spend, colored by opportunity cluster
///
/// Customers without a cluster (model not run) are drawn in black.
pub fn create_cluster_scatter(customers: &[PredictionRecord], output_path: &Path) -> anyhow::Result<()> {
    let frequency: Vec<f64> = customers
        .iter()
        .map(|c| c.segmented.scored.customer.frequency)
        .collect();
    let monetary: Vec<f64> = customers
        .iter()
        .map(|c| c.segmented.scored.customer.monetary)
        .collect();
    let (x_min, x_max) = padded_bounds(&frequency, 0.05);
    let (y_min, y_max) = padded_bounds(&monetary, 0.05);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Frequency vs Monetary by Cluster", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Frequency")
        .y_desc("Monetary")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(customers.iter().zip(frequency.iter().zip(&monetary)).map(
        |(customer, (&f, &m))| {
            let color = customer.cluster.map(palette_color).unwrap_or(BLACK);
            Circle::new((f, m), 4, color.filled())
        },
    ))?;

    root.present()?;
    tracing::info!(path = %output_path.display(), "cluster scatter saved");
    Ok(())
}

/// Render both charts next to `base` and return their paths
pub fn generate_charts(
    report: &SegmentReport,
    customers: &[PredictionRecord],
    base: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let segments_path = derived_path(base, "segments");
    create_segment_chart(report, &segments_path)?;

    let clusters_path = derived_path(base, "clusters");
    create_cluster_scatter(customers, &clusters_path)?;

    Ok(vec![segments_path, clusters_path])
}
