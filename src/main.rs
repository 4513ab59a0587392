//! RfmForge: RFM segmentation and predictive analytics CLI
//!
//! Loads a customer CSV, runs the full analysis and writes the result bundle
//! as JSON, optionally rendering charts alongside.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rfmforge::{analyze, load_csv, viz, Args, InsightBundle};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.engine_config()?;
    let start_time = Instant::now();

    let df = load_csv(&args.input).with_context(|| format!("failed to load {}", args.input))?;
    let bundle = analyze(&df, &args.columns(), &args.segment_type, &config)?;

    tracing::info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "pipeline complete"
    );

    if let Some(ref base) = args.plot {
        let paths = viz::generate_charts(&bundle.rfm_analysis, &bundle.customers, Path::new(base))?;
        for path in paths {
            eprintln!("Chart saved to: {}", path.display());
        }
    }

    let json = serde_json::to_string_pretty(&bundle)?;
    match args.output {
        Some(ref path) => {
            fs::write(path, json).with_context(|| format!("failed to write {path}"))?;
            print_summary(&bundle);
            println!("\nResults saved to: {path}");
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Stderr logging; `RUST_LOG` overrides the level chosen by `--verbose`
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rfmforge={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_summary(bundle: &InsightBundle) {
    let rfm = &bundle.rfm_analysis;
    let predictive = &bundle.predictive_analytics;

    println!("=== RFM Analysis ({}) ===", bundle.segment_type);
    println!("As of: {}", bundle.as_of);
    println!("Customers: {}\n", rfm.total_customers());

    for entry in &rfm.polar_area_data {
        println!("  {:<20} {:>6} ({:.1}%)", entry.segment.label(), entry.count, entry.percentage);
    }

    let churn = &predictive.churn.metrics;
    println!("\n=== Churn Model ===");
    println!(
        "Accuracy: {:.3}  Precision: {:.3}  Recall: {:.3}  F1: {:.3}",
        churn.accuracy, churn.precision, churn.recall, churn.f1
    );
    match churn.auc {
        Some(auc) => println!("AUC: {auc:.3}"),
        None => println!("AUC: n/a (single class in held-out set)"),
    }

    let opportunities = &predictive.upsell_crosssell;
    println!("\n=== Opportunities ===");
    println!("Clusters: {}", opportunities.optimal_clusters);
    println!("Upsell: {}  Cross-sell: {}", opportunities.upsell_opportunities, opportunities.crosssell_opportunities);

    let ltv = &predictive.ltv.metrics;
    println!("\n=== LTV Model ===");
    println!("RMSE: {:.2}  MAE: {:.2}  R2: {:.3}", ltv.rmse, ltv.mae, ltv.r2);

    let insights = &predictive.insights;
    println!("\n=== Insights ===");
    println!("High value at risk: {}", insights.high_value_at_risk_count);
    println!("Upsell targets: {}", insights.upsell_targets_count);
    println!("Cross-sell targets: {}", insights.crosssell_targets_count);
}
