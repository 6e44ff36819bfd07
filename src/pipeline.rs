// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Prequential (test-then-train) evaluation loop
//!
//! Orchestrates, for every record in arrival order:
//! - Routing by marker (test / train / invalid)
//! - Test path: learner prediction, then metric accumulation
//! - Train path: sample weighting, then learner update
//! - Final report and result serialization
//!
//! Records are processed strictly one after another: a prediction may
//! only reflect training records that arrived before it.

use crate::config::{EvaluationConfig, Mode};
use crate::error::{ConfigError, EvalError};
use crate::learners::{Learner, Prediction};
use crate::metrics::{ConfusionMatrix, ErrorAccumulator, InstanceCounts, Outcome, Report};
use crate::record::{Record, Schema, Value};
use crate::router::{Route, Router};
use crate::sink::{ResultSink, TestRow};
use crate::stream::RecordStream;
use crate::weighting::WeightPolicy;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Lifecycle of an evaluation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    /// Configured, no record read yet
    Ready,
    /// At least one record processed
    Running,
    /// Report emitted; the loop cannot be reused
    Finished,
}

#[derive(Debug, Clone)]
enum Accumulator {
    Classification {
        positive_class: usize,
        normal_class: Option<usize>,
        matrix: ConfusionMatrix,
    },
    Regression { errors: ErrorAccumulator },
}

impl Accumulator {
    fn outcome(&self) -> Outcome {
        match self {
            Accumulator::Classification { matrix, .. } => Outcome::Classification(matrix.snapshot()),
            Accumulator::Regression { errors } => Outcome::Regression(errors.snapshot()),
        }
    }
}

/// Single-pass prequential evaluator
pub struct EvaluationLoop {
    config: EvaluationConfig,
    router: Router,
    policy: WeightPolicy,
    learner: Box<dyn Learner>,
    accumulator: Accumulator,
    counts: InstanceCounts,
    state: LoopState,
    num_attributes: usize,
    started: Option<Instant>,
    elapsed_secs: f64,
}

impl EvaluationLoop {
    /// Validate `config` against the stream schema and configure the learner.
    ///
    /// Every configuration error surfaces here, before any record is read.
    pub fn new(config: EvaluationConfig, schema: &Schema, mut learner: Box<dyn Learner>) -> Result<Self> {
        config.validate_schema(schema)?;

        if !learner.supports(config.mode) {
            return Err(ConfigError::UnsupportedMode {
                learner: learner.name().to_string(),
                mode: config.mode.to_string(),
            }
            .into());
        }

        let router = Router::new(schema, config.marker_index)?
            .with_literals(&config.test_marker, &config.train_marker);
        let policy = WeightPolicy::new(config.weighting)?;

        learner
            .configure(router.stripped_schema())
            .with_context(|| format!("Failed to configure learner '{}'", learner.name()))?;

        let accumulator = match config.mode {
            Mode::Classification => Accumulator::Classification {
                positive_class: config.positive_class_index(schema)?,
                normal_class: config.normal_class_index(schema)?,
                matrix: ConfusionMatrix::new(),
            },
            Mode::Regression => Accumulator::Regression {
                errors: ErrorAccumulator::new(),
            },
        };

        tracing::info!(
            "Evaluating {} on '{}' ({} mode, marker '{}', weighting {})",
            learner.name(),
            schema.relation,
            config.mode,
            schema.attributes[router.marker_index()].name,
            config.weighting.name()
        );

        Ok(Self {
            config,
            router,
            policy,
            learner,
            accumulator,
            counts: InstanceCounts::default(),
            state: LoopState::Ready,
            num_attributes: schema.num_attributes(),
            started: None,
            elapsed_secs: 0.0,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn counts(&self) -> InstanceCounts {
        self.counts
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn learner(&self) -> &dyn Learner {
        self.learner.as_ref()
    }

    /// Current metrics without finishing the run.
    ///
    /// Elapsed time is as of the last processed record, so repeated calls
    /// with no record in between return equal reports.
    pub fn snapshot(&self) -> Report {
        Report {
            counts: self.counts,
            outcome: self.accumulator.outcome(),
            elapsed_secs: self.elapsed_secs,
        }
    }

    /// Process one record
    pub fn process(&mut self, record: Record, sink: &mut dyn ResultSink) -> Result<()> {
        match self.state {
            LoopState::Finished => return Err(EvalError::AlreadyFinished.into()),
            LoopState::Ready => {
                self.state = LoopState::Running;
                self.started = Some(Instant::now());
            }
            LoopState::Running => {}
        }

        let ordinal = self.counts.total() + 1;
        if record.len() != self.num_attributes {
            bail!(
                "record {} has {} values, schema declares {}",
                ordinal,
                record.len(),
                self.num_attributes
            );
        }

        let outcome = match self.router.route(record) {
            Route::Invalid { marker } => {
                tracing::warn!("Marker value '{}' is not recognized (record {})", marker, ordinal);
                self.counts.invalid += 1;
                Ok(())
            }
            Route::Test(record) => self.test(record, ordinal, sink),
            Route::Train(record) => self.train(record, ordinal),
        };
        self.mark_elapsed();
        outcome
    }

    fn mark_elapsed(&mut self) {
        if let Some(started) = self.started {
            self.elapsed_secs = started.elapsed().as_secs_f64();
        }
    }

    fn test(&mut self, record: Record, ordinal: u64, sink: &mut dyn ResultSink) -> Result<()> {
        match &mut self.accumulator {
            Accumulator::Classification { positive_class, matrix, .. } => {
                let actual = match record.label() {
                    Value::Nominal(class) => class,
                    _ => {
                        tracing::warn!("Test record {} has no class label", ordinal);
                        self.counts.invalid += 1;
                        return Ok(());
                    }
                };

                let start = Instant::now();
                let predicted = match self.learner.predict(&record).with_context(|| format!("Prediction failed on record {}", ordinal))? {
                    Prediction::Class(class) => class,
                    Prediction::Value(v) => bail!("learner returned numeric prediction {} in classification mode", v),
                };
                let time_nanos = start.elapsed().as_nanos();

                matrix.observe(actual == *positive_class, predicted == *positive_class);
                self.counts.tests += 1;
                tracing::debug!("Record {}: test, predicted {} actual {}", ordinal, predicted, actual);

                if self.config.emit_rows {
                    sink.write_row(&TestRow::Classification {
                        num_tests: self.counts.tests,
                        num_trains: self.counts.trains,
                        predicted_class: predicted,
                        actual_class: actual,
                        matrix: matrix.clone(),
                        time_nanos,
                    })?;
                }
            }
            Accumulator::Regression { errors } => {
                let actual = match record.label() {
                    Value::Numeric(y) => y,
                    _ => {
                        tracing::warn!("Test record {} has no numeric label", ordinal);
                        self.counts.invalid += 1;
                        return Ok(());
                    }
                };
                let record = log_transform(record, self.config.log_min);

                let start = Instant::now();
                let raw = match self.learner.predict(&record).with_context(|| format!("Prediction failed on record {}", ordinal))? {
                    Prediction::Value(v) => v,
                    Prediction::Class(c) => bail!("learner returned class {} in regression mode", c),
                };
                let prediction = match self.config.log_min {
                    Some(log_min) if log_min >= 0.0 => raw.exp() - 1.0 + log_min,
                    _ => raw,
                };
                let time_nanos = start.elapsed().as_nanos();

                let (error, square_error) = errors.observe(prediction, actual);
                self.counts.tests += 1;
                tracing::debug!("Record {}: test, predicted {} actual {}", ordinal, prediction, actual);

                if self.config.emit_rows {
                    sink.write_row(&TestRow::Regression {
                        num_tests: self.counts.tests,
                        num_trains: self.counts.trains,
                        prediction,
                        actual,
                        error,
                        square_error,
                        time_nanos,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn train(&mut self, record: Record, ordinal: u64) -> Result<()> {
        let record = match &self.accumulator {
            Accumulator::Classification { positive_class, normal_class, .. } => {
                let class = match record.label() {
                    Value::Nominal(class) => class,
                    _ => {
                        tracing::warn!("Training record {} has no class label", ordinal);
                        self.counts.invalid += 1;
                        return Ok(());
                    }
                };
                if normal_class.is_some_and(|normal| normal != class) {
                    self.counts.filtered += 1;
                    return Ok(());
                }
                let weight = self.policy.weight(class == *positive_class);
                record.with_weight(weight)
            }
            Accumulator::Regression { .. } => {
                if !matches!(record.label(), Value::Numeric(_)) {
                    tracing::warn!("Training record {} has no numeric label", ordinal);
                    self.counts.invalid += 1;
                    return Ok(());
                }
                let record = log_transform(record, self.config.log_min);
                if let (Some(threshold), Some(y)) = (self.config.train_threshold, record.label().as_numeric()) {
                    if y <= threshold {
                        self.counts.filtered += 1;
                        return Ok(());
                    }
                }
                record
            }
        };

        self.learner
            .train_on(&record, record.weight())
            .with_context(|| format!("Training failed on record {}", ordinal))?;
        self.counts.trains += 1;
        tracing::debug!("Record {}: train, weight {}", ordinal, record.weight());
        Ok(())
    }

    /// Close the run: compute the report and emit it through `sink`
    pub fn finish(&mut self, sink: &mut dyn ResultSink) -> Result<Report> {
        if self.state == LoopState::Finished {
            return Err(EvalError::AlreadyFinished.into());
        }
        self.mark_elapsed();
        self.state = LoopState::Finished;

        let report = self.snapshot();
        sink.write_summary(&report)?;
        sink.finish()?;

        tracing::info!(
            "Finished: {} test, {} train, {} invalid, {} filtered in {:.3}s",
            report.counts.tests,
            report.counts.trains,
            report.counts.invalid,
            report.counts.filtered,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Drain `stream` through the loop and finish
    pub fn run(&mut self, stream: &mut dyn RecordStream, sink: &mut dyn ResultSink) -> Result<Report> {
        if self.state == LoopState::Finished {
            return Err(EvalError::AlreadyFinished.into());
        }
        while let Some(record) = stream
            .next_record()
            .with_context(|| format!("Stream failed after {} records", self.counts.total()))?
        {
            self.process(record, sink)?;
        }
        self.finish(sink)
    }

    /// Save results to JSON file
    pub fn save_results(results: &EvaluationResults, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write results: {}", output_path.display()))?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }
}

/// Adjusted log transform of a numeric label: `ln(y + 1 - log_min)`
fn log_transform(mut record: Record, log_min: Option<f64>) -> Record {
    if let (Some(log_min), Value::Numeric(y)) = (log_min, record.label()) {
        if log_min >= 0.0 {
            record.set_label(Value::Numeric((y + 1.0 - log_min).ln()));
        }
    }
    record
}

/// Complete results of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResults {
    pub config: EvaluationConfig,
    pub relation: String,
    pub learner: String,
    pub learner_description: String,
    pub report: Report,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl EvaluationResults {
    /// Collect the results of a finished `evaluation` over `relation`
    pub fn from_run(evaluation: &EvaluationLoop, relation: &str, report: Report) -> Self {
        Self {
            config: evaluation.config().clone(),
            relation: relation.to_string(),
            learner: evaluation.learner().name().to_string(),
            learner_description: evaluation.learner().description().to_string(),
            report,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build the configured learner, run the whole stream and collect results
pub fn evaluate(
    config: &EvaluationConfig,
    stream: &mut dyn RecordStream,
    sink: &mut dyn ResultSink,
) -> Result<EvaluationResults> {
    let relation = stream.schema().relation.clone();
    let mut evaluation = EvaluationLoop::new(config.clone(), stream.schema(), config.learner.build())?;
    let report = evaluation.run(stream, sink)?;
    Ok(EvaluationResults::from_run(&evaluation, &relation, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::LearnerKind;
    use crate::record::Attribute;
    use crate::sink::{CsvSink, NullSink};
    use crate::stream::MemoryStream;
    use crate::weighting::Weighting;
    use std::sync::{Arc, Mutex};

    /// Learner that always predicts one class and logs every call
    struct Scripted {
        class: usize,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(class: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (Self { class, calls: calls.clone() }, calls)
        }
    }

    impl Learner for Scripted {
        fn configure(&mut self, schema: &Schema) -> Result<()> {
            self.calls.lock().unwrap().push(format!("configure:{}", schema.num_attributes()));
            Ok(())
        }

        fn train_on(&mut self, record: &Record, weight: f64) -> Result<()> {
            self.calls.lock().unwrap().push(format!("train:{:?}:{}", record.label(), weight));
            Ok(())
        }

        fn predict(&self, record: &Record) -> Result<Prediction> {
            self.calls.lock().unwrap().push(format!("predict:{}", record.len()));
            Ok(Prediction::Class(self.class))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn description(&self) -> &str {
            "test learner"
        }

        fn supports(&self, mode: Mode) -> bool {
            mode == Mode::Classification
        }
    }

    /// Learner whose predictions always fail
    struct Broken;

    impl Learner for Broken {
        fn configure(&mut self, _schema: &Schema) -> Result<()> {
            Ok(())
        }

        fn train_on(&mut self, _record: &Record, _weight: f64) -> Result<()> {
            Ok(())
        }

        fn predict(&self, _record: &Record) -> Result<Prediction> {
            bail!("model file corrupted")
        }

        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn supports(&self, _mode: Mode) -> bool {
            true
        }
    }

    // class {positive, negative}, marker {T, F, X}
    fn schema() -> Schema {
        Schema::new(
            "flags",
            vec![
                Attribute::numeric("x"),
                Attribute::nominal("class", &["positive", "negative"]),
                Attribute::nominal("train", &["T", "F", "X"]),
            ],
            1,
        )
        .unwrap()
    }

    const T: usize = 0;
    const F: usize = 1;
    const X: usize = 2;
    const POS: usize = 0;
    const NEG: usize = 1;

    fn rec(marker: usize, class: usize) -> Record {
        Record::new(vec![Value::Numeric(1.0), Value::Nominal(class), Value::Nominal(marker)], 1)
    }

    fn config() -> EvaluationConfig {
        EvaluationConfig {
            positive_class: Some("positive".to_string()),
            ..EvaluationConfig::default()
        }
    }

    fn run_records(config: EvaluationConfig, learner: Box<dyn Learner>, records: Vec<Record>) -> Result<Report> {
        let schema = schema();
        let mut stream = MemoryStream::new(schema.clone(), records);
        let mut evaluation = EvaluationLoop::new(config, &schema, learner)?;
        evaluation.run(&mut stream, &mut NullSink)
    }

    #[test]
    fn test_train_train_test_sequence() {
        let (learner, _) = Scripted::new(POS);
        let report = run_records(
            config(),
            Box::new(learner),
            vec![rec(T, POS), rec(T, NEG), rec(F, POS)],
        )
        .unwrap();

        let metrics = report.classification().unwrap();
        let cm = &metrics.confusion_matrix;
        assert_eq!(cm.actual_pos, 1);
        assert_eq!(cm.actual_neg, 0);
        assert_eq!(cm.tp, 1);
        assert_eq!(cm.fp, 0);
        assert_eq!(cm.fn_, 0);
        assert_eq!(cm.tn, 0);
        assert_eq!(metrics.accuracy, Some(1.0));
        assert_eq!(metrics.precision, Some(1.0));
        assert_eq!(metrics.recall, Some(1.0));
        assert_eq!(metrics.specificity, None);
        assert_eq!(report.counts, InstanceCounts { tests: 1, trains: 2, invalid: 0, filtered: 0 });
    }

    #[test]
    fn test_invalid_marker_skips_learner() {
        let (learner, calls) = Scripted::new(POS);
        let report = run_records(config(), Box::new(learner), vec![rec(X, POS)]).unwrap();

        assert_eq!(report.counts.invalid, 1);
        assert_eq!(report.counts.tests + report.counts.trains, 0);
        // Only the configure call reached the learner
        assert_eq!(*calls.lock().unwrap(), vec!["configure:2".to_string()]);
        assert_eq!(report.classification().unwrap().confusion_matrix.total(), 0);
    }

    #[test]
    fn test_learner_never_sees_marker() {
        let (learner, calls) = Scripted::new(POS);
        run_records(config(), Box::new(learner), vec![rec(T, NEG), rec(F, NEG)]).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], "configure:2");
        assert_eq!(calls[1], "train:Nominal(1):1");
        assert_eq!(calls[2], "predict:2");
    }

    #[test]
    fn test_inverse_proportional_weights_reach_learner() {
        let (learner, calls) = Scripted::new(POS);
        let config = EvaluationConfig {
            weighting: Weighting::InverseProportional { positive: 1.0, negative: 2.0 },
            ..config()
        };
        run_records(config, Box::new(learner), vec![rec(T, POS), rec(T, POS), rec(T, NEG)]).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1], "train:Nominal(0):1");
        assert_eq!(calls[2], "train:Nominal(0):0");
        assert_eq!(calls[3], "train:Nominal(1):2");
    }

    #[test]
    fn test_normal_class_training_filter() {
        let (learner, calls) = Scripted::new(NEG);
        let config = EvaluationConfig {
            normal_class: Some("negative".to_string()),
            ..config()
        };
        let report = run_records(
            config,
            Box::new(learner),
            vec![rec(T, POS), rec(T, NEG), rec(T, POS), rec(F, POS), rec(X, NEG)],
        )
        .unwrap();

        assert_eq!(report.counts, InstanceCounts { tests: 1, trains: 1, invalid: 1, filtered: 2 });
        let calls = calls.lock().unwrap();
        let trained: Vec<&String> = calls.iter().filter(|c| c.starts_with("train:")).collect();
        assert_eq!(trained, vec!["train:Nominal(1):1"]);
    }

    #[test]
    fn test_prequential_order() {
        let config = EvaluationConfig {
            learner: LearnerKind::NoChange,
            ..config()
        };
        // Each prediction only reflects the training records before it
        let report = run_records(
            config,
            LearnerKind::NoChange.build(),
            vec![rec(T, NEG), rec(F, POS), rec(T, POS), rec(F, POS)],
        )
        .unwrap();
        let cm = &report.classification().unwrap().confusion_matrix;
        assert_eq!(cm.fn_, 1);
        assert_eq!(cm.tp, 1);
    }

    #[test]
    fn test_counting_invariants_on_random_streams() {
        for seed in [1, 7, 42, 1234] {
            let mut stream = MemoryStream::synthetic(400, seed);
            let schema = stream.schema().clone();
            let total = stream.len() as u64;
            let config = EvaluationConfig {
                positive_class: Some("M".to_string()),
                weighting: Weighting::InverseProportional { positive: 1.0, negative: 1.0 },
                ..EvaluationConfig::default()
            };
            let mut evaluation = EvaluationLoop::new(config, &schema, LearnerKind::NaiveBayes.build()).unwrap();
            let report = evaluation.run(&mut stream, &mut NullSink).unwrap();

            let cm = &report.classification().unwrap().confusion_matrix;
            assert_eq!(cm.actual_pos + cm.actual_neg, report.counts.tests);
            assert_eq!(report.counts.trains + report.counts.tests + report.counts.invalid, total);
            assert!(cm.is_consistent());
            assert!(report.counts.invalid > 0);
        }
    }

    #[test]
    fn test_naive_bayes_beats_chance_on_synthetic() {
        let mut stream = MemoryStream::synthetic(2000, 3);
        let schema = stream.schema().clone();
        let results = evaluate(
            &EvaluationConfig {
                positive_class: Some("M".to_string()),
                ..EvaluationConfig::default()
            },
            &mut stream,
            &mut NullSink,
        )
        .unwrap();
        assert_eq!(results.relation, schema.relation);
        assert_eq!(results.learner, "naive-bayes");
        let accuracy = results.report.classification().unwrap().accuracy.unwrap();
        assert!(accuracy > 0.7, "accuracy {}", accuracy);
    }

    #[test]
    fn test_loop_states_and_reuse() {
        let schema = schema();
        let (learner, _) = Scripted::new(POS);
        let mut evaluation = EvaluationLoop::new(config(), &schema, Box::new(learner)).unwrap();
        assert_eq!(evaluation.state(), LoopState::Ready);

        evaluation.process(rec(T, POS), &mut NullSink).unwrap();
        assert_eq!(evaluation.state(), LoopState::Running);

        evaluation.finish(&mut NullSink).unwrap();
        assert_eq!(evaluation.state(), LoopState::Finished);

        let err = evaluation.process(rec(F, POS), &mut NullSink).unwrap_err();
        assert!(matches!(err.downcast_ref::<EvalError>(), Some(EvalError::AlreadyFinished)));
        let mut stream = MemoryStream::new(schema, vec![]);
        assert!(evaluation.run(&mut stream, &mut NullSink).is_err());
    }

    #[test]
    fn test_empty_stream_reports_undefined() {
        let (learner, _) = Scripted::new(POS);
        let report = run_records(config(), Box::new(learner), vec![]).unwrap();
        assert_eq!(report.counts.total(), 0);
        assert_eq!(report.classification().unwrap().accuracy, None);
        assert_eq!(report.elapsed_secs, 0.0);
    }

    #[test]
    fn test_snapshot_idempotent() {
        let schema = schema();
        let (learner, _) = Scripted::new(POS);
        let mut evaluation = EvaluationLoop::new(config(), &schema, Box::new(learner)).unwrap();
        evaluation.process(rec(F, NEG), &mut NullSink).unwrap();
        evaluation.finish(&mut NullSink).unwrap();
        assert_eq!(evaluation.snapshot(), evaluation.snapshot());
    }

    #[test]
    fn test_snapshot_idempotent_while_running() {
        let mut stream = MemoryStream::synthetic(20, 5);
        let schema = stream.schema().clone();
        let config = EvaluationConfig {
            positive_class: Some("M".to_string()),
            ..EvaluationConfig::default()
        };
        let mut evaluation = EvaluationLoop::new(config, &schema, LearnerKind::NaiveBayes.build()).unwrap();
        while let Some(record) = stream.next_record().unwrap() {
            evaluation.process(record, &mut NullSink).unwrap();
        }
        assert_eq!(evaluation.state(), LoopState::Running);

        let first = evaluation.snapshot();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = evaluation.snapshot();
        assert_eq!(first, second);
        assert_eq!(first.counts.total(), 20);
    }

    #[test]
    fn test_unknown_positive_class_fails_before_run() {
        let (learner, calls) = Scripted::new(POS);
        let config = EvaluationConfig {
            positive_class: Some("E".to_string()),
            ..config()
        };
        let err = EvaluationLoop::new(config, &schema(), Box::new(learner)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownPositiveClass { .. })
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_learner_mode() {
        let err = EvaluationLoop::new(config(), &schema(), LearnerKind::TargetMean.build())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnsupportedMode { .. })
        ));
    }

    #[test]
    fn test_learner_failure_is_terminal() {
        let err = run_records(config(), Box::new(Broken), vec![rec(T, POS), rec(F, POS)]).unwrap_err();
        assert!(format!("{:#}", err).contains("model file corrupted"));
    }

    #[test]
    fn test_missing_label_counts_invalid() {
        let (learner, _) = Scripted::new(POS);
        let unlabeled = Record::new(vec![Value::Numeric(1.0), Value::Missing, Value::Nominal(F)], 1);
        let report = run_records(config(), Box::new(learner), vec![unlabeled, rec(F, POS)]).unwrap();
        assert_eq!(report.counts.invalid, 1);
        assert_eq!(report.counts.tests, 1);
    }

    #[test]
    fn test_rows_written_per_test_record() {
        let schema = schema();
        let (learner, _) = Scripted::new(NEG);
        let mut evaluation = EvaluationLoop::new(config(), &schema, Box::new(learner)).unwrap();
        let mut stream = MemoryStream::new(schema, vec![rec(T, POS), rec(F, POS), rec(F, NEG), rec(X, NEG)]);
        let mut sink = CsvSink::new(Vec::new(), Mode::Classification).unwrap();
        evaluation.run(&mut stream, &mut sink).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // header + 2 test rows + summary
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1,1,1,0,1,0,0,0,0,1,"));
        assert!(lines[2].starts_with("2,1,1,1,1,1,0,1,0,1,"));
        // accuracy 0.5, F1 undefined (no true positives, no predicted positives)
        assert!(lines[3].starts_with("2,1,0.5,NaN,1,1,0,1,0,1,"));
    }

    #[test]
    fn test_rows_suppressed() {
        let schema = schema();
        let (learner, _) = Scripted::new(POS);
        let config = EvaluationConfig {
            emit_rows: false,
            ..config()
        };
        let mut evaluation = EvaluationLoop::new(config, &schema, Box::new(learner)).unwrap();
        let mut stream = MemoryStream::new(schema, vec![rec(F, POS), rec(F, NEG)]);
        let mut sink = CsvSink::new(Vec::new(), Mode::Classification).unwrap();
        evaluation.run(&mut stream, &mut sink).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        // header + summary only
        assert_eq!(text.lines().count(), 2);
    }

    fn regression_stream(records: &[(usize, f64)]) -> MemoryStream {
        let schema = Schema::new(
            "load",
            vec![
                Attribute::numeric("x"),
                Attribute::numeric("y"),
                Attribute::nominal("train", &["T", "F"]),
            ],
            1,
        )
        .unwrap();
        let records = records
            .iter()
            .map(|(marker, y)| Record::new(vec![Value::Numeric(0.0), Value::Numeric(*y), Value::Nominal(*marker)], 1))
            .collect();
        MemoryStream::new(schema, records)
    }

    fn regression_config() -> EvaluationConfig {
        EvaluationConfig {
            mode: Mode::Regression,
            learner: LearnerKind::TargetMean,
            ..EvaluationConfig::default()
        }
    }

    #[test]
    fn test_regression_mae_rmse() {
        let mut stream = regression_stream(&[(0, 2.0), (0, 4.0), (1, 5.0), (1, 1.0)]);
        let results = evaluate(&regression_config(), &mut stream, &mut NullSink).unwrap();

        let metrics = results.report.regression().unwrap();
        // mean 3.0; errors 2 and 2
        assert!((metrics.mae.unwrap() - 2.0).abs() < 1e-12);
        assert!((metrics.rmse.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(results.report.counts.trains, 2);
    }

    #[test]
    fn test_regression_threshold_filters_training() {
        let config = EvaluationConfig {
            train_threshold: Some(3.0),
            ..regression_config()
        };
        let mut stream = regression_stream(&[(0, 2.0), (0, 3.0), (0, 6.0), (1, 6.0)]);
        let results = evaluate(&config, &mut stream, &mut NullSink).unwrap();

        let counts = results.report.counts;
        assert_eq!(counts.filtered, 2);
        assert_eq!(counts.trains, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(results.report.regression().unwrap().mae, Some(0.0));
    }

    #[test]
    fn test_regression_log_transform_round_trips_prediction() {
        let config = EvaluationConfig {
            log_min: Some(0.0),
            ..regression_config()
        };
        let mut stream = regression_stream(&[(0, 9.0), (1, 9.0)]);
        let results = evaluate(&config, &mut stream, &mut NullSink).unwrap();
        // ln(10) trained, exp(ln(10)) - 1 predicted
        assert!(results.report.regression().unwrap().mae.unwrap() < 1e-9);
    }

    #[test]
    fn test_save_results_json() {
        let mut stream = MemoryStream::synthetic(50, 11);
        let results = evaluate(
            &EvaluationConfig {
                positive_class: Some("M".to_string()),
                learner: LearnerKind::Majority,
                ..EvaluationConfig::default()
            },
            &mut stream,
            &mut NullSink,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");
        EvaluationLoop::save_results(&results, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: EvaluationResults = serde_json::from_str(&text).unwrap();
        assert_eq!(back.report, results.report);
        assert_eq!(back.learner, "majority");
        assert_eq!(back.version, env!("CARGO_PKG_VERSION"));
    }
}
