//! K-Means clustering of customers and upsell/cross-sell detection

use std::collections::{BTreeMap, BTreeSet};

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::features::StandardScaler;
use crate::config::EngineConfig;
use crate::error::{ModelKind, RfmError};
use crate::segment::{Segment, SegmentedRecord, SegmentedTable};

/// High spend, low frequency
pub fn has_upsell_potential(record: &SegmentedRecord) -> bool {
    record.scored.m_score >= 3 && record.scored.f_score <= 2
}

/// High frequency, low spend
pub fn has_crosssell_potential(record: &SegmentedRecord) -> bool {
    record.scored.f_score >= 3 && record.scored.m_score <= 2
}

/// K-Means model wrapper with fitted parameters
#[derive(Debug)]
pub struct KMeansModel {
    pub n_clusters: usize,
    /// Cluster assignments for the fitted rows
    pub labels: Array1<usize>,
    /// Cluster centroids in standardised space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl KMeansModel {
    /// Mean silhouette coefficient over every fitted row
    pub fn silhouette(&self, features: &Array2<f64>) -> f64 {
        silhouette_score(features, &self.labels, self.n_clusters)
    }
}

/// Fit K-Means with a seeded generator so repeated runs agree
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    max_iters: u64,
    tolerance: f64,
    seed: u64,
) -> crate::Result<KMeansModel> {
    if features.nrows() < n_clusters {
        return Err(RfmError::model_fit(
            ModelKind::Opportunity,
            format!(
                "number of customers ({}) must be at least equal to number of clusters ({})",
                features.nrows(),
                n_clusters
            ),
        ));
    }

    let n_samples = features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let model = KMeans::params_with(n_clusters, StdRng::seed_from_u64(seed), L2Dist)
        .max_n_iterations(max_iters)
        .tolerance(tolerance)
        .fit(&dataset)
        .map_err(|e| RfmError::model_fit(ModelKind::Opportunity, e.to_string()))?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Silhouette coefficient averaged over all rows
///
/// Rows alone in their cluster, or with no other cluster to compare against,
/// contribute 0.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>, n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    if n_samples < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        let mut same_cluster_distances = Vec::new();
        let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); n_clusters];

        for j in 0..n_samples {
            if i == j {
                continue;
            }

            let distance = euclidean_distance(&point, &features.row(j));
            let other_label = labels[j];

            if other_label == cluster_label {
                same_cluster_distances.push(distance);
            } else if other_label < n_clusters {
                other_cluster_distances[other_label].push(distance);
            }
        }

        if same_cluster_distances.is_empty() {
            continue;
        }
        let a_i = same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64;

        let b_i = other_cluster_distances
            .iter()
            .filter(|distances| !distances.is_empty())
            .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
            .fold(f64::INFINITY, f64::min);

        if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
            continue;
        }
        silhouette_sum += (b_i - a_i) / a_i.max(b_i);
    }

    silhouette_sum / n_samples as f64
}

fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAnalysis {
    pub cluster: usize,
    pub count: usize,
    pub avg_recency_score: f64,
    pub avg_frequency_score: f64,
    pub avg_monetary_score: f64,
    pub segments: BTreeMap<Segment, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityReport {
    pub optimal_clusters: usize,
    pub silhouette_scores: BTreeMap<usize, f64>,
    pub cluster_analysis: Vec<ClusterAnalysis>,
    pub inertia: f64,
    pub upsell_opportunities: usize,
    pub crosssell_opportunities: usize,
}

/// Final clustering plus the per-customer opportunity flags
#[derive(Debug)]
pub struct OpportunityModel {
    pub kmeans: KMeansModel,
    pub report: OpportunityReport,
    /// One per customer, in table order
    pub clusters: Vec<usize>,
    pub upsell: Vec<bool>,
    pub crosssell: Vec<bool>,
}

impl OpportunityModel {
    /// Standardise the R/F/M scores, pick the cluster count with the best
    /// silhouette, refit at that count and flag opportunities
    pub fn fit(table: &SegmentedTable, config: &EngineConfig) -> crate::Result<Self> {
        let n_customers = table.len();
        let min_k = config.min_clusters.max(2);
        let max_k = config.max_clusters.max(min_k);
        if n_customers <= max_k {
            return Err(RfmError::model_fit(
                ModelKind::Opportunity,
                format!(
                    "need at least {} customers to search up to {} clusters, got {}",
                    max_k + 1,
                    max_k,
                    n_customers
                ),
            ));
        }

        // a single profile has no second cluster to compare against
        let profiles: BTreeSet<(u8, u8, u8)> = table
            .records()
            .iter()
            .map(|r| (r.scored.r_score, r.scored.f_score, r.scored.m_score))
            .collect();
        if profiles.len() < 2 {
            return Err(RfmError::model_fit(
                ModelKind::Opportunity,
                "every customer shares one score profile",
            ));
        }

        let mut raw = Array2::<f64>::zeros((n_customers, 3));
        for (i, record) in table.records().iter().enumerate() {
            raw[[i, 0]] = record.scored.r_score as f64;
            raw[[i, 1]] = record.scored.f_score as f64;
            raw[[i, 2]] = record.scored.m_score as f64;
        }
        let features = StandardScaler::fit(&raw).transform(&raw);

        let mut silhouette_scores = BTreeMap::new();
        let mut best: Option<(usize, f64)> = None;
        for k in min_k..=max_k {
            let model = fit_kmeans(
                &features,
                k,
                config.kmeans_max_iters,
                config.kmeans_tolerance,
                config.seed,
            )?;
            let score = model.silhouette(&features);
            tracing::debug!(k, silhouette = score, "evaluated cluster count");
            silhouette_scores.insert(k, score);
            // strict comparison keeps the lowest k on ties
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((k, score));
            }
        }
        let optimal_clusters = best.map(|(k, _)| k).unwrap_or(min_k);

        let kmeans = fit_kmeans(
            &features,
            optimal_clusters,
            config.kmeans_max_iters,
            config.kmeans_tolerance,
            config.seed,
        )?;
        let clusters = kmeans.labels.to_vec();

        let upsell: Vec<bool> = table.records().iter().map(has_upsell_potential).collect();
        let crosssell: Vec<bool> = table.records().iter().map(has_crosssell_potential).collect();

        let report = OpportunityReport {
            optimal_clusters,
            silhouette_scores,
            cluster_analysis: cluster_analysis(table, &clusters, optimal_clusters),
            inertia: kmeans.inertia,
            upsell_opportunities: upsell.iter().filter(|&&flag| flag).count(),
            crosssell_opportunities: crosssell.iter().filter(|&&flag| flag).count(),
        };

        tracing::info!(
            optimal_clusters,
            upsell = report.upsell_opportunities,
            crosssell = report.crosssell_opportunities,
            "fitted opportunity clusters"
        );

        Ok(Self {
            kmeans,
            report,
            clusters,
            upsell,
            crosssell,
        })
    }
}

fn cluster_analysis(table: &SegmentedTable, clusters: &[usize], n_clusters: usize) -> Vec<ClusterAnalysis> {
    (0..n_clusters)
        .map(|cluster| {
            let members: Vec<&SegmentedRecord> = table
                .records()
                .iter()
                .zip(clusters)
                .filter(|(_, &c)| c == cluster)
                .map(|(record, _)| record)
                .collect();

            let count = members.len();
            let mean = |score: fn(&SegmentedRecord) -> u8| {
                if count == 0 {
                    0.0
                } else {
                    members.iter().map(|r| score(r) as f64).sum::<f64>() / count as f64
                }
            };

            let mut segments = BTreeMap::new();
            for record in &members {
                *segments.entry(record.segment).or_insert(0) += 1;
            }

            ClusterAnalysis {
                cluster,
                count,
                avg_recency_score: mean(|r| r.scored.r_score),
                avg_frequency_score: mean(|r| r.scored.f_score),
                avg_monetary_score: mean(|r| r.scored.m_score),
                segments,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CustomerRecord;
    use crate::predict::fixtures::{segmented_table, synthetic_table};
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [-1.0, -1.0, -1.0],
            [-1.1, -0.9, -1.0],
            [-0.9, -1.1, -1.0],
            [1.0, 1.0, 1.0],
            [1.1, 0.9, 1.0],
            [0.9, 1.1, 1.0],
        ]
    }

    #[test]
    fn test_fit_kmeans() {
        let features = two_blobs();
        let model = fit_kmeans(&features, 2, 100, 1e-4, 42).unwrap();

        assert_eq!(model.n_clusters, 2);
        assert_eq!(model.labels.len(), 6);
        assert_eq!(model.centroids.shape(), &[2, 3]);
        assert!(model.inertia >= 0.0 && model.inertia.is_finite());

        assert!(model.labels.iter().take(3).all(|&l| l == model.labels[0]));
        assert!(model.labels.iter().skip(3).all(|&l| l == model.labels[3]));
        assert_ne!(model.labels[0], model.labels[3]);
    }

    #[test]
    fn test_fit_kmeans_too_few_points() {
        let features = two_blobs();
        assert!(fit_kmeans(&features, 7, 100, 1e-4, 42).is_err());
    }

    #[test]
    fn test_silhouette_well_separated() {
        let features = two_blobs();
        let labels = array![0, 0, 0, 1, 1, 1];
        let score = silhouette_score(&features, &labels, 2);
        assert!(score > 0.9, "silhouette {score}");

        let single = array![0, 0, 0, 0, 0, 0];
        assert_eq!(silhouette_score(&features, &single, 1), 0.0);
    }

    #[test]
    fn test_opportunity_model_search() {
        let table = synthetic_table(40);
        let model = OpportunityModel::fit(&table, &EngineConfig::default()).unwrap();
        let report = &model.report;

        assert_eq!(
            report.silhouette_scores.keys().copied().collect::<Vec<_>>(),
            (2..=7).collect::<Vec<_>>()
        );
        let best = report
            .silhouette_scores
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.silhouette_scores[&report.optimal_clusters], best);
        // the first k reaching the maximum wins
        let first_best = report
            .silhouette_scores
            .iter()
            .find(|(_, &score)| score == best)
            .map(|(&k, _)| k)
            .unwrap();
        assert_eq!(report.optimal_clusters, first_best);

        assert_eq!(model.clusters.len(), 40);
        assert!(model.clusters.iter().all(|&c| c < report.optimal_clusters));
        assert_eq!(
            report.cluster_analysis.iter().map(|c| c.count).sum::<usize>(),
            40
        );
    }

    #[test]
    fn test_opportunity_flags_follow_scores() {
        let table = synthetic_table(40);
        let model = OpportunityModel::fit(&table, &EngineConfig::default()).unwrap();

        for (i, record) in table.records().iter().enumerate() {
            let s = &record.scored;
            assert_eq!(model.upsell[i], s.m_score >= 3 && s.f_score <= 2);
            assert_eq!(model.crosssell[i], s.f_score >= 3 && s.m_score <= 2);
        }
        assert_eq!(
            model.report.upsell_opportunities,
            model.upsell.iter().filter(|&&f| f).count()
        );
    }

    #[test]
    fn test_too_few_customers_for_search() {
        let table = synthetic_table(7);
        let err = OpportunityModel::fit(&table, &EngineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("need at least 8 customers"));
    }

    fn group(prefix: &str, n: usize, recency_days: i64, frequency: f64, monetary: f64) -> Vec<CustomerRecord> {
        (0..n)
            .map(|i| CustomerRecord {
                customer_id: format!("{prefix}{i}"),
                recency_days,
                frequency,
                monetary,
            })
            .collect()
    }

    #[test]
    fn test_search_covers_range_with_few_profiles() {
        // three score profiles: (4, 2, 2), (4, 1, 1) and (3, 1, 1)
        let mut records = group("A", 7, 5, 20.0, 5000.0);
        records.extend(group("B", 7, 100, 5.0, 500.0));
        records.extend(group("C", 6, 300, 1.0, 50.0));
        let table = segmented_table(records);

        let model = OpportunityModel::fit(&table, &EngineConfig::default()).unwrap();
        let report = &model.report;
        assert_eq!(
            report.silhouette_scores.keys().copied().collect::<Vec<_>>(),
            (2..=7).collect::<Vec<_>>()
        );
        assert_eq!(report.optimal_clusters, 3);
        assert!((report.silhouette_scores[&3] - 1.0).abs() < 1e-9);
        assert!(report.silhouette_scores[&2] < 1.0);
    }

    #[test]
    fn test_single_profile_cannot_be_clustered() {
        let table = segmented_table(group("S", 12, 30, 4.0, 250.0));
        let err = OpportunityModel::fit(&table, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, RfmError::ModelFit(_)));
        assert!(err.to_string().contains("one score profile"));
    }
}
