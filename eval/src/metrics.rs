// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classification metrics for binary 0/1 predictions
//!
//! Only overall performance lives here. Group-wise fairness quantities such
//! as demographic-parity disparity come precomputed with the sweep.

use serde::{Deserialize, Serialize};

/// Confusion matrix for binary classification (1 = positive class)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[u8], ground_truth: &[u8]) -> Self {
        assert_eq!(predictions.len(), ground_truth.len(), "Prediction and ground truth lengths must match");

        let mut matrix = Self::default();

        for (&pred, &truth) in predictions.iter().zip(ground_truth.iter()) {
            match (pred != 0, truth != 0) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }

        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.tp + self.tn) as f64 / total as f64
    }

    /// Error rate: (FP + FN) / Total
    pub fn error_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.fp + self.fn_) as f64 / total as f64
    }

    /// Fraction of rows predicted positive
    pub fn selection_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.tp + self.fp) as f64 / total as f64
    }

    pub fn precision(&self) -> f64 {
        let denom = self.tp + self.fp;
        if denom == 0 {
            return 0.0;
        }
        self.tp as f64 / denom as f64
    }

    pub fn recall(&self) -> f64 {
        let denom = self.tp + self.fn_;
        if denom == 0 {
            return 0.0;
        }
        self.tp as f64 / denom as f64
    }

    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }

    /// Matthews Correlation Coefficient, in [-1, 1]
    pub fn mcc(&self) -> f64 {
        let tp = self.tp as f64;
        let tn = self.tn as f64;
        let fp = self.fp as f64;
        let fn_ = self.fn_ as f64;

        let numerator = tp * tn - fp * fn_;
        let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();

        if denominator == 0.0 {
            return 0.0;
        }
        numerator / denominator
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub error_rate: f64,
    pub selection_rate: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub mcc: f64,
    /// Area under the ROC curve, when scores were available
    pub auc_roc: Option<f64>,
    pub support: usize,
}

impl ClassificationReport {
    pub fn from_confusion_matrix(cm: ConfusionMatrix) -> Self {
        Self {
            accuracy: cm.accuracy(),
            error_rate: cm.error_rate(),
            selection_rate: cm.selection_rate(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1_score: cm.f1_score(),
            mcc: cm.mcc(),
            auc_roc: None,
            support: cm.total(),
            confusion_matrix: cm,
        }
    }

    pub fn from_predictions(predictions: &[u8], ground_truth: &[u8]) -> Self {
        Self::from_confusion_matrix(ConfusionMatrix::from_predictions(predictions, ground_truth))
    }

    /// Report with AUC-ROC from positive-class probabilities
    pub fn from_scores(predictions: &[u8], ground_truth: &[u8], probabilities: &[f64]) -> Self {
        let mut report = Self::from_predictions(predictions, ground_truth);
        report.auc_roc = Some(auc_roc(ground_truth, probabilities));
        report
    }

    pub fn format(&self) -> String {
        let mut out = format!(
            r#"Classification Report
=====================
Accuracy:        {:.4}
Error Rate:      {:.4}
Selection Rate:  {:.4}
Precision:       {:.4}
Recall:          {:.4}
F1 Score:        {:.4}
MCC:             {:.4}
Support:         {}
"#,
            self.accuracy,
            self.error_rate,
            self.selection_rate,
            self.precision,
            self.recall,
            self.f1_score,
            self.mcc,
            self.support,
        );
        if let Some(auc) = self.auc_roc {
            out.push_str(&format!("AUC-ROC:         {:.4}\n", auc));
        }
        out.push_str(&format!(
            r#"
Confusion Matrix:
              Predicted
              >50K   <=50K
Actual >50K  {:>6} {:>6}
       <=50K {:>6} {:>6}
"#,
            self.confusion_matrix.tp, self.confusion_matrix.fn_, self.confusion_matrix.fp, self.confusion_matrix.tn,
        ));
        out
    }
}

/// Area under the ROC curve by the trapezoidal rule; 0.5 when a class is absent
pub fn auc_roc(ground_truth: &[u8], probabilities: &[f64]) -> f64 {
    let mut pairs: Vec<(u8, f64)> = ground_truth.iter().copied().zip(probabilities.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let n_pos = pairs.iter().filter(|(l, _)| *l != 0).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;

    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let mut tpr_prev = 0.0;
    let mut fpr_prev = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut auc = 0.0;

    // Equal scores form one group and one diagonal step
    for (i, (label, score)) in pairs.iter().enumerate() {
        if *label != 0 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        if pairs.get(i + 1).is_some_and(|(_, next)| next == score) {
            continue;
        }

        let tpr = tp / n_pos;
        let fpr = fp / n_neg;
        auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;

        tpr_prev = tpr;
        fpr_prev = fpr;
    }

    auc
}
