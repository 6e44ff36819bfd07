// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Prequential (test-then-train) evaluation of online learners
//!
//! This crate provides:
//! - Labeled record streams (ARFF files, in-memory and seeded synthetic streams)
//! - Test/train routing by a per-record marker attribute
//! - Class-rebalancing sample weights (constant, inverse-proportional)
//! - Running binary classification metrics and regression errors
//! - A pluggable learner trait with simple built-in learners
//! - Per-record CSV output and a final report

pub mod config;
pub mod error;
pub mod learners;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod router;
pub mod sink;
pub mod stream;
pub mod weighting;

pub use config::{EvaluationConfig, Mode};
pub use error::{ConfigError, EvalError};
pub use learners::{Learner, LearnerKind, Prediction};
pub use metrics::{ClassificationReport, ConfusionMatrix, InstanceCounts, RegressionReport, Report};
pub use pipeline::{evaluate, EvaluationLoop, EvaluationResults, LoopState};
pub use record::{Attribute, AttributeKind, Marker, Record, Schema, Value};
pub use router::{Route, Router};
pub use sink::{CsvSink, NullSink, ResultSink, TestRow};
pub use stream::{ArffStream, MemoryStream, RecordStream};
pub use weighting::{WeightPolicy, Weighting};
