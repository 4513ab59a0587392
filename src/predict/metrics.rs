//! Held-out evaluation metrics for the classifier and the regressor

use linfa::prelude::{BinaryClassification, Pr, SingleTargetRegression};
use ndarray::Array1;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when the held-out rows contain a single class
    pub auc: Option<f64>,
}

impl ClassificationMetrics {
    pub fn evaluate(y_true: &[bool], y_pred: &[bool], y_score: &[f64]) -> Self {
        Self {
            accuracy: accuracy_score(y_true, y_pred),
            precision: precision_score(y_true, y_pred),
            recall: recall_score(y_true, y_pred),
            f1: f1_score(y_true, y_pred),
            auc: roc_auc_score(y_true, y_score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    /// All zeros for an empty held-out set
    pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Self {
        let truth = Array1::from(y_true.to_vec());
        let predicted = Array1::from(y_pred.to_vec());

        let mse = predicted.mean_squared_error(&truth).unwrap_or(0.0);
        Self {
            mse,
            rmse: mse.sqrt(),
            mae: predicted.mean_absolute_error(&truth).unwrap_or(0.0),
            r2: r2_score(&truth, &predicted),
        }
    }
}

fn confusion(y_true: &[bool], y_pred: &[bool]) -> (usize, usize, usize, usize) {
    debug_assert_eq!(y_true.len(), y_pred.len());
    let (mut tp, mut fp, mut tn, mut fn_) = (0, 0, 0, 0);
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }
    (tp, fp, tn, fn_)
}

// Counted here rather than with linfa's ConfusionMatrix: its binary
// precision and recall describe whichever label its HashSet yields first.

pub fn accuracy_score(y_true: &[bool], y_pred: &[bool]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let (tp, _, tn, _) = confusion(y_true, y_pred);
    (tp + tn) as f64 / y_true.len() as f64
}

/// 0 when nothing was predicted positive
pub fn precision_score(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let (tp, fp, _, _) = confusion(y_true, y_pred);
    if tp + fp == 0 {
        return 0.0;
    }
    tp as f64 / (tp + fp) as f64
}

/// 0 when there are no actual positives
pub fn recall_score(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let (tp, _, _, fn_) = confusion(y_true, y_pred);
    if tp + fn_ == 0 {
        return 0.0;
    }
    tp as f64 / (tp + fn_) as f64
}

pub fn f1_score(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let precision = precision_score(y_true, y_pred);
    let recall = recall_score(y_true, y_pred);
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Area under linfa's ROC curve; tied scores form one diagonal step
///
/// `None` when only one class is present or a score is not a probability.
pub fn roc_auc_score(y_true: &[bool], y_score: &[f64]) -> Option<f64> {
    debug_assert_eq!(y_true.len(), y_score.len());
    let n_pos = y_true.iter().filter(|&&t| t).count();
    if n_pos == 0 || n_pos == y_true.len() {
        return None;
    }

    let probabilities = y_score
        .iter()
        .map(|&score| Pr::try_from(score as f32).ok())
        .collect::<Option<Array1<Pr>>>()?;
    let roc = probabilities.roc(y_true).ok()?;
    Some(f64::from(roc.area_under_curve()))
}

/// Coefficient of determination; 1 for a perfect fit of a constant target
/// and 0 for any other fit of one
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let Some(&first) = y_true.first() else {
        return 0.0;
    };
    if y_true.iter().all(|&t| t == first) {
        return if y_true == y_pred { 1.0 } else { 0.0 };
    }
    y_pred.r2(y_true).unwrap_or(0.0)
}
