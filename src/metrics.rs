// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Running evaluation metrics for binary classification and regression
//!
//! Implements:
//! - Confusion matrix accumulated one test record at a time
//! - Accuracy, Precision, NPV, Recall, Specificity, Fall-out, Miss rate, F1
//! - Matthews Correlation Coefficient (MCC) and balanced accuracy
//! - MAE and RMSE for numeric predictions
//!
//! A metric whose denominator is zero is `None` ("undefined"), never 0.

use serde::{Deserialize, Serialize};

/// Divide, or `None` when the denominator is zero
fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

/// Render an optional metric for human-readable output
pub fn render_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{:.4}", v))
}

/// Confusion matrix for binary classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Test records whose actual class is positive
    pub actual_pos: u64,
    /// Test records whose actual class is negative
    pub actual_neg: u64,
    /// True Positives
    pub tp: u64,
    /// True Negatives
    pub tn: u64,
    /// False Positives (negative predicted as positive)
    pub fp: u64,
    /// False Negatives (positive predicted as negative)
    pub fn_: u64,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one test outcome
    pub fn observe(&mut self, actual_positive: bool, predicted_positive: bool) {
        match (actual_positive, predicted_positive) {
            (true, true) => {
                self.actual_pos += 1;
                self.tp += 1;
            }
            (true, false) => {
                self.actual_pos += 1;
                self.fn_ += 1;
            }
            (false, false) => {
                self.actual_neg += 1;
                self.tn += 1;
            }
            (false, true) => {
                self.actual_neg += 1;
                self.fp += 1;
            }
        }
        debug_assert!(self.is_consistent());
    }

    /// `TP + FN == actual positives` and `TN + FP == actual negatives`
    pub fn is_consistent(&self) -> bool {
        self.tp + self.fn_ == self.actual_pos && self.tn + self.fp == self.actual_neg
    }

    /// Total number of test records observed
    pub fn total(&self) -> u64 {
        self.actual_pos + self.actual_neg
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Negative predictive value: TN / (TN + FN)
    pub fn npv(&self) -> Option<f64> {
        ratio(self.tn, self.tn + self.fn_)
    }

    /// Recall (Sensitivity): TP / actual positives
    pub fn recall(&self) -> Option<f64> {
        ratio(self.tp, self.actual_pos)
    }

    /// Specificity: TN / actual negatives
    pub fn specificity(&self) -> Option<f64> {
        ratio(self.tn, self.actual_neg)
    }

    /// Fall-out (false positive rate): FP / actual negatives
    pub fn fall_out(&self) -> Option<f64> {
        ratio(self.fp, self.actual_neg)
    }

    /// Miss rate (false negative rate): FN / actual positives
    pub fn miss_rate(&self) -> Option<f64> {
        ratio(self.fn_, self.actual_pos)
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> Option<f64> {
        let precision = self.precision()?;
        let recall = self.recall()?;
        let denom = precision + recall;
        if denom == 0.0 {
            return None;
        }
        Some(2.0 * precision * recall / denom)
    }

    /// Matthews Correlation Coefficient (MCC), in [-1, 1]
    pub fn mcc(&self) -> Option<f64> {
        let tp = self.tp as f64;
        let tn = self.tn as f64;
        let fp = self.fp as f64;
        let fn_ = self.fn_ as f64;

        let numerator = tp * tn - fp * fn_;
        let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();

        if denominator == 0.0 {
            return None;
        }
        Some(numerator / denominator)
    }

    /// Balanced Accuracy: (Recall + Specificity) / 2
    pub fn balanced_accuracy(&self) -> Option<f64> {
        Some((self.recall()? + self.specificity()?) / 2.0)
    }

    /// Derive every metric from the current counters.
    ///
    /// Pure read: two snapshots without an intervening `observe` are equal.
    pub fn snapshot(&self) -> ClassificationReport {
        ClassificationReport::from_confusion_matrix(self.clone())
    }
}

/// Derived metrics for a confusion matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub npv: Option<f64>,
    pub recall: Option<f64>,
    pub specificity: Option<f64>,
    pub fall_out: Option<f64>,
    pub miss_rate: Option<f64>,
    pub f1_score: Option<f64>,
    pub mcc: Option<f64>,
    pub balanced_accuracy: Option<f64>,
}

impl ClassificationReport {
    /// Generate full report from confusion matrix
    pub fn from_confusion_matrix(cm: ConfusionMatrix) -> Self {
        Self {
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            npv: cm.npv(),
            recall: cm.recall(),
            specificity: cm.specificity(),
            fall_out: cm.fall_out(),
            miss_rate: cm.miss_rate(),
            f1_score: cm.f1_score(),
            mcc: cm.mcc(),
            balanced_accuracy: cm.balanced_accuracy(),
            confusion_matrix: cm,
        }
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let cm = &self.confusion_matrix;
        format!(
            r#"Confusion Matrix
                          Actual
                     Positive  Negative     TOTAL
Predicted Positive  {:>9} {:>9} {:>9}
          Negative  {:>9} {:>9} {:>9}
          TOTAL     {:>9} {:>9} {:>9}

Accuracy Metrics
 - Accuracy          = {}
 - Precision         = {}
 - NPV               = {}
 - Recall            = {}
 - Specificity       = {}
 - Fall-out          = {}
 - Miss rate         = {}
 - F1 Score          = {}
 - MCC               = {}
 - Balanced Accuracy = {}
"#,
            cm.tp, cm.fp, cm.tp + cm.fp,
            cm.fn_, cm.tn, cm.fn_ + cm.tn,
            cm.actual_pos, cm.actual_neg, cm.total(),
            render_metric(self.accuracy),
            render_metric(self.precision),
            render_metric(self.npv),
            render_metric(self.recall),
            render_metric(self.specificity),
            render_metric(self.fall_out),
            render_metric(self.miss_rate),
            render_metric(self.f1_score),
            render_metric(self.mcc),
            render_metric(self.balanced_accuracy),
        )
    }
}

/// Absolute and squared error sums for numeric predictions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorAccumulator {
    pub count: u64,
    pub sum_errors: f64,
    pub sum_square_errors: f64,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one prediction; returns `(error, square_error)`
    pub fn observe(&mut self, predicted: f64, actual: f64) -> (f64, f64) {
        let error = (predicted - actual).abs();
        let square_error = error * error;
        self.count += 1;
        self.sum_errors += error;
        self.sum_square_errors += square_error;
        (error, square_error)
    }

    /// Mean absolute error
    pub fn mae(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum_errors / self.count as f64)
    }

    /// Root mean squared error
    pub fn rmse(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum_square_errors / self.count as f64).sqrt())
    }

    pub fn snapshot(&self) -> RegressionReport {
        RegressionReport {
            errors: self.clone(),
            mae: self.mae(),
            rmse: self.rmse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub errors: ErrorAccumulator,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
}

impl RegressionReport {
    pub fn format(&self) -> String {
        format!(
            "Errors\n - MAE  = {}\n - RMSE = {}\n",
            render_metric(self.mae),
            render_metric(self.rmse)
        )
    }
}

/// How many records took each path through the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCounts {
    pub tests: u64,
    pub trains: u64,
    /// Unrecognised marker or missing label
    pub invalid: u64,
    /// Train records skipped by the regression threshold
    pub filtered: u64,
}

impl InstanceCounts {
    pub fn total(&self) -> u64 {
        self.tests + self.trains + self.invalid + self.filtered
    }
}

/// Metrics for whichever evaluation mode ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Outcome {
    Classification(ClassificationReport),
    Regression(RegressionReport),
}

/// Immutable end-of-run snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub counts: InstanceCounts,
    pub outcome: Outcome,
    /// Wall-clock seconds spent in the loop
    pub elapsed_secs: f64,
}

impl Report {
    pub fn classification(&self) -> Option<&ClassificationReport> {
        match &self.outcome {
            Outcome::Classification(report) => Some(report),
            Outcome::Regression(_) => None,
        }
    }

    pub fn regression(&self) -> Option<&RegressionReport> {
        match &self.outcome {
            Outcome::Regression(report) => Some(report),
            Outcome::Classification(_) => None,
        }
    }

    /// Format the final report block
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str("======================\n");
        output.push_str("     FINAL REPORT     \n");
        output.push_str("======================\n");
        output.push_str(&format!("Done! in {:.6} seconds\n", self.elapsed_secs));
        output.push_str("Instances\n");
        output.push_str(&format!(" - Test     = {}\n", self.counts.tests));
        output.push_str(&format!(" - Train    = {}\n", self.counts.trains));
        output.push_str(&format!(" - Invalid  = {}\n", self.counts.invalid));
        if self.counts.filtered > 0 {
            output.push_str(&format!(" - Filtered = {}\n", self.counts.filtered));
        }
        output.push('\n');

        match &self.outcome {
            Outcome::Classification(report) => output.push_str(&report.format()),
            Outcome::Regression(report) => output.push_str(&report.format()),
        }

        output
    }
}
