// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Result output: per-record CSV rows and the final summary row

use crate::config::Mode;
use crate::metrics::{ConfusionMatrix, Outcome, Report};
use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_NAME: &str = "out.csv";

pub const CLASSIFICATION_HEADER: [&str; 11] = [
    "num_tests",
    "num_trains",
    "predicted_class",
    "actual_class",
    "actual_pos",
    "actual_neg",
    "true_pos",
    "true_neg",
    "false_pos",
    "false_neg",
    "time",
];

pub const REGRESSION_HEADER: [&str; 7] = [
    "num_tests",
    "num_trains",
    "prediction",
    "actual_value",
    "error",
    "square_error",
    "time",
];

/// One scored test record
#[derive(Debug, Clone, PartialEq)]
pub enum TestRow {
    Classification {
        num_tests: u64,
        num_trains: u64,
        predicted_class: usize,
        actual_class: usize,
        /// Counters after this record was observed
        matrix: ConfusionMatrix,
        /// Prediction latency
        time_nanos: u128,
    },
    Regression {
        num_tests: u64,
        num_trains: u64,
        prediction: f64,
        actual: f64,
        error: f64,
        square_error: f64,
        time_nanos: u128,
    },
}

/// Destination for evaluation output, written only by the evaluation loop
pub trait ResultSink {
    fn write_row(&mut self, row: &TestRow) -> Result<()>;

    fn write_summary(&mut self, report: &Report) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn write_row(&mut self, _row: &TestRow) -> Result<()> {
        Ok(())
    }

    fn write_summary(&mut self, _report: &Report) -> Result<()> {
        Ok(())
    }
}

/// Undefined metrics are written as `NaN`, never as 0
fn csv_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "NaN".to_string(), |v| v.to_string())
}

/// CSV writer with a mode-specific header
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    /// Create (or overwrite) the output file; see [`resolve_output_path`]
    pub fn create(path: &Path, mode: Mode) -> Result<Self> {
        let path = resolve_output_path(path, DEFAULT_OUTPUT_NAME)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        tracing::info!("Writing results to {}", path.display());
        Self::new(file, mode)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap a writer and emit the header immediately
    pub fn new(inner: W, mode: Mode) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        match mode {
            Mode::Classification => writer.write_record(CLASSIFICATION_HEADER)?,
            Mode::Regression => writer.write_record(REGRESSION_HEADER)?,
        }
        Ok(Self { writer })
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush CSV output: {}", e.error()))
    }
}

impl<W: Write> ResultSink for CsvSink<W> {
    fn write_row(&mut self, row: &TestRow) -> Result<()> {
        match row {
            TestRow::Classification {
                num_tests,
                num_trains,
                predicted_class,
                actual_class,
                matrix,
                time_nanos,
            } => self.writer.write_record([
                num_tests.to_string(),
                num_trains.to_string(),
                predicted_class.to_string(),
                actual_class.to_string(),
                matrix.actual_pos.to_string(),
                matrix.actual_neg.to_string(),
                matrix.tp.to_string(),
                matrix.tn.to_string(),
                matrix.fp.to_string(),
                matrix.fn_.to_string(),
                time_nanos.to_string(),
            ])?,
            TestRow::Regression {
                num_tests,
                num_trains,
                prediction,
                actual,
                error,
                square_error,
                time_nanos,
            } => self.writer.write_record([
                num_tests.to_string(),
                num_trains.to_string(),
                prediction.to_string(),
                actual.to_string(),
                error.to_string(),
                square_error.to_string(),
                time_nanos.to_string(),
            ])?,
        }
        Ok(())
    }

    fn write_summary(&mut self, report: &Report) -> Result<()> {
        let counts = &report.counts;
        match &report.outcome {
            // Per-record class columns carry accuracy and F1
            Outcome::Classification(metrics) => {
                let cm = &metrics.confusion_matrix;
                self.writer.write_record([
                    counts.tests.to_string(),
                    counts.trains.to_string(),
                    csv_metric(metrics.accuracy),
                    csv_metric(metrics.f1_score),
                    cm.actual_pos.to_string(),
                    cm.actual_neg.to_string(),
                    cm.tp.to_string(),
                    cm.tn.to_string(),
                    cm.fp.to_string(),
                    cm.fn_.to_string(),
                    report.elapsed_secs.to_string(),
                ])?;
            }
            // Error columns carry MAE and RMSE
            Outcome::Regression(metrics) => {
                self.writer.write_record([
                    counts.tests.to_string(),
                    counts.trains.to_string(),
                    "0".to_string(),
                    "0".to_string(),
                    csv_metric(metrics.mae),
                    csv_metric(metrics.rmse),
                    report.elapsed_secs.to_string(),
                ])?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Decide which file to write for a user-supplied output path.
///
/// - existing directory: `default_name` inside it
/// - existing file: overwritten
/// - missing path with an extension: treated as a file, parents created
/// - missing path without an extension: created as a directory, `default_name` inside
pub fn resolve_output_path(path: &Path, default_name: &str) -> Result<PathBuf> {
    if path.is_dir() {
        let file = path.join(default_name);
        if file.exists() {
            tracing::info!("Overriding existing file {}", file.display());
        }
        return Ok(file);
    }

    if path.exists() {
        tracing::info!("Overriding existing file {}", path.display());
        return Ok(path.to_path_buf());
    }

    if path.extension().is_some() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        return Ok(path.to_path_buf());
    }

    tracing::info!("Creating output directory {}", path.display());
    std::fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {}", path.display()))?;
    Ok(path.join(default_name))
}
