//! Feature matrices, standardisation and the seeded train/test split

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::segment::SegmentedTable;

/// Model inputs for churn and LTV: scores, composite, recency days and a
/// one-hot column per segment present in the batch
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub records: Array2<f64>,
}

impl FeatureMatrix {
    pub fn from_table(table: &SegmentedTable) -> Self {
        let segments = table.present_segments();

        let mut names: Vec<String> = ["r_score", "f_score", "m_score", "rfm_score", "recency_days"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        names.extend(segments.iter().map(|segment| format!("segment_{segment}")));

        let mut records = Array2::<f64>::zeros((table.len(), names.len()));
        for (i, record) in table.records().iter().enumerate() {
            let scored = &record.scored;
            records[[i, 0]] = scored.r_score as f64;
            records[[i, 1]] = scored.f_score as f64;
            records[[i, 2]] = scored.m_score as f64;
            records[[i, 3]] = scored.rfm_score as f64;
            records[[i, 4]] = scored.customer.recency_days as f64;
            if let Some(offset) = segments.iter().position(|s| *s == record.segment) {
                records[[i, 5 + offset]] = 1.0;
            }
        }

        Self { names, records }
    }

    pub fn nrows(&self) -> usize {
        self.records.nrows()
    }

    pub fn rows(&self, indices: &[usize]) -> Array2<f64> {
        self.records.select(Axis(0), indices)
    }
}

/// Zero-mean, unit-variance scaling per column
///
/// Constant columns keep a scale of 1 so they map to zeros instead of NaN.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> Self {
        let n_features = features.ncols();
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > f64::EPSILON { std } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }
}

/// Row indices of a shuffled hold-out split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_rows` with `seed` and hold out `ceil(n_rows * test_size)`
/// rows for evaluation
///
/// Returns `None` when either side would be empty.
pub fn train_test_split(n_rows: usize, test_size: f64, seed: u64) -> Option<TrainTestSplit> {
    let n_test = (n_rows as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return None;
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Some(TrainTestSplit {
        train,
        test: indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CustomerRecord, CustomerTable};
    use crate::scoring::score;
    use crate::segment::{classify, Segment};
    use ndarray::array;

    #[test]
    fn test_feature_matrix_layout() {
        let rows = [(5, 20.0, 5000.0), (20, 10.0, 2500.0), (150, 1.0, 100.0)];
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, &(recency_days, frequency, monetary))| CustomerRecord {
                customer_id: format!("C{i}"),
                recency_days,
                frequency,
                monetary,
            })
            .collect();
        let table = classify(score(CustomerTable::from_records(records).unwrap()));
        let features = FeatureMatrix::from_table(&table);

        let n_segments = table.present_segments().len();
        assert_eq!(features.names.len(), 5 + n_segments);
        assert_eq!(features.records.shape(), &[3, 5 + n_segments]);
        assert_eq!(features.records[[0, 4]], 5.0);

        // exactly one segment flag per row
        for row in features.records.outer_iter() {
            let flags: f64 = row.iter().skip(5).sum();
            assert_eq!(flags, 1.0);
        }

        let first = table.records()[0].segment;
        assert_eq!(first, Segment::Champions);
        assert!(features.names.contains(&"segment_Champions".to_string()));
    }

    #[test]
    fn test_standard_scaler() {
        let raw = array![[1.0, 5.0], [3.0, 5.0], [5.0, 5.0]];
        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(&raw);

        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-12));
        assert!((scaled.column(0).std(0.0) - 1.0).abs() < 1e-12);
        // constant column becomes zeros, not NaN
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let split = train_test_split(10, 0.3, 42).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(train_test_split(10, 0.3, 42), Some(split));
    }

    #[test]
    fn test_split_rejects_degenerate_sizes() {
        assert_eq!(train_test_split(1, 0.3, 42), None);
        assert_eq!(train_test_split(0, 0.3, 42), None);
        assert!(train_test_split(2, 0.3, 42).is_some());
    }
}
