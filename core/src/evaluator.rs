//! Classification metrics over (true labels, predicted labels, scores).

use crate::{
    error::{DetectError, DetectResult},
    generator::Transaction,
    types::Label,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[Label], y_pred: &[Label]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (0, 0) => cm.true_negative += 1,
                (0, _) => cm.false_positive += 1,
                (_, 0) => cm.false_negative += 1,
                _ => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassReport {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self { precision, recall, f1, support: tp + fn_ }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RocPoint {
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationMetrics {
    pub confusion: ConfusionMatrix,
    pub normal: ClassReport,
    pub anomaly: ClassReport,
    pub accuracy: f64,
    /// None when scores were not given or only one class is present.
    pub auc: Option<f64>,
    #[serde(skip)]
    pub roc: Vec<RocPoint>,
}

pub fn evaluate(
    y_true: &[Label],
    y_pred: &[Label],
    scores: Option<&[f64]>,
) -> DetectResult<EvaluationMetrics> {
    if y_pred.len() != y_true.len() {
        return Err(DetectError::DataShape { expected: y_true.len(), actual: y_pred.len() });
    }
    if let Some(s) = scores {
        if s.len() != y_true.len() {
            return Err(DetectError::DataShape { expected: y_true.len(), actual: s.len() });
        }
    }

    let cm = ConfusionMatrix::from_labels(y_true, y_pred);
    let anomaly = ClassReport::from_counts(cm.true_positive, cm.false_positive, cm.false_negative);
    let normal = ClassReport::from_counts(cm.true_negative, cm.false_negative, cm.false_positive);
    let accuracy = if cm.total() == 0 {
        0.0
    } else {
        (cm.true_positive + cm.true_negative) as f64 / cm.total() as f64
    };

    let (auc, roc) = match scores {
        Some(s) => (roc_auc(y_true, s), roc_curve(y_true, s)),
        None => (None, Vec::new()),
    };
    if let Some(auc) = auc {
        log::info!("evaluator: ROC AUC {auc:.4}");
    }

    Ok(EvaluationMetrics { confusion: cm, normal, anomaly, accuracy, auc, roc })
}

/// Area under the ROC curve as the Mann-Whitney statistic, with tied
/// scores sharing their average rank.
pub fn roc_auc(y_true: &[Label], scores: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&y| y != 0).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; the tie group i..=j shares the mean rank.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] != 0 {
                positive_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// ROC points at every distinct score, highest threshold first.
pub fn roc_curve(y_true: &[Label], scores: &[f64]) -> Vec<RocPoint> {
    let positives = y_true.iter().filter(|&&y| y != 0).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![RocPoint {
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
        threshold: f64::INFINITY,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &idx) in order.iter().enumerate() {
        if y_true[idx] != 0 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_group {
            points.push(RocPoint {
                false_positive_rate: fp as f64 / negatives as f64,
                true_positive_rate: tp as f64 / positives as f64,
                threshold: scores[idx],
            });
        }
    }
    points
}

/// The `n` highest-scoring transactions, most anomalous first.
pub fn top_anomalies<'a>(
    transactions: &'a [Transaction],
    scores: &[f64],
    n: usize,
) -> Vec<(&'a Transaction, f64)> {
    let mut ranked: Vec<(&Transaction, f64)> =
        transactions.iter().zip(scores.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(n);
    ranked
}

/// Plain-text classification report and confusion matrix.
pub fn render_report(metrics: &EvaluationMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "              precision    recall  f1-score   support");
    for (name, r) in [("Normal", &metrics.normal), ("Anomaly", &metrics.anomaly)] {
        let _ = writeln!(
            out,
            "{name:>12}  {:>9.2}  {:>8.2}  {:>8.2}  {:>8}",
            r.precision, r.recall, r.f1, r.support
        );
    }
    let _ = writeln!(out, "{:>12}  {:>29.2}  {:>8}", "accuracy", metrics.accuracy, metrics.confusion.total());
    let _ = writeln!(out);
    let cm = &metrics.confusion;
    let _ = writeln!(out, "                 Predicted Normal  Predicted Anomaly");
    let _ = writeln!(out, "Actual Normal    {:<16}  {}", cm.true_negative, cm.false_positive);
    let _ = writeln!(out, "Actual Anomaly   {:<16}  {}", cm.false_negative, cm.true_positive);
    if let Some(auc) = metrics.auc {
        let _ = writeln!(out);
        let _ = writeln!(out, "ROC AUC: {auc:.4}");
    }
    out
}
