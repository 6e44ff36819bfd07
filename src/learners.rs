// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Online learners driven by the evaluation loop
//!
//! Implements:
//! - Majority class (weighted class counts)
//! - No-change (repeats the most recent training label)
//! - Naive Bayes (categorical counts + Gaussian numeric attributes)
//! - Target mean and last value for numeric labels
//!
//! All learners are incremental: every `train_on` call updates the model
//! in place, and `predict` only reflects records trained on before it.

use crate::config::Mode;
use crate::error::ConfigError;
use crate::record::{AttributeKind, Record, Schema, Value};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output of a learner for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// Index into the label's declared value set
    Class(usize),
    /// Numeric estimate of the label
    Value(f64),
}

/// Capability the evaluation loop needs from a learning algorithm
pub trait Learner: Send {
    /// Set up the model for records shaped like `schema`
    fn configure(&mut self, schema: &Schema) -> Result<()>;

    /// Update the model with one weighted record
    fn train_on(&mut self, record: &Record, weight: f64) -> Result<()>;

    /// Predict the label of `record` without looking at it
    fn predict(&self, record: &Record) -> Result<Prediction>;

    /// Get model name
    fn name(&self) -> &str;

    /// Get model description
    fn description(&self) -> &str;

    /// Whether this learner can run in `mode`
    fn supports(&self, mode: Mode) -> bool;
}

/// Built-in learners, selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LearnerKind {
    Majority,
    NoChange,
    NaiveBayes,
    TargetMean,
    LastValue,
}

impl LearnerKind {
    pub const ALL: [LearnerKind; 5] = [
        LearnerKind::Majority,
        LearnerKind::NoChange,
        LearnerKind::NaiveBayes,
        LearnerKind::TargetMean,
        LearnerKind::LastValue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LearnerKind::Majority => "majority",
            LearnerKind::NoChange => "no-change",
            LearnerKind::NaiveBayes => "naive-bayes",
            LearnerKind::TargetMean => "target-mean",
            LearnerKind::LastValue => "last-value",
        }
    }

    /// Construct a fresh, unconfigured learner
    pub fn build(&self) -> Box<dyn Learner> {
        match self {
            LearnerKind::Majority => Box::new(MajorityClass::new()),
            LearnerKind::NoChange => Box::new(NoChange::new()),
            LearnerKind::NaiveBayes => Box::new(NaiveBayes::new()),
            LearnerKind::TargetMean => Box::new(TargetMean::new()),
            LearnerKind::LastValue => Box::new(LastValue::new()),
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LearnerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LearnerKind::ALL
            .iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ConfigError::UnknownLearner(s.to_string()))
    }
}

/// Number of declared classes, or an error for numeric labels
fn class_count(schema: &Schema) -> Result<usize> {
    match schema.label_values() {
        Some(values) if !values.is_empty() => Ok(values.len()),
        Some(_) => bail!("label attribute '{}' declares no values", schema.label().name),
        None => bail!("label attribute '{}' is not nominal", schema.label().name),
    }
}

/// Index of the largest entry; ties go to the lowest index
fn max_index(scores: &[f64]) -> usize {
    let mut best = 0;
    for (idx, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = idx;
        }
    }
    best
}

/// Majority class: predicts the class with the largest total training weight
#[derive(Debug, Clone, Default)]
pub struct MajorityClass {
    class_weights: Vec<f64>,
}

impl MajorityClass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Learner for MajorityClass {
    fn configure(&mut self, schema: &Schema) -> Result<()> {
        self.class_weights = vec![0.0; class_count(schema)?];
        Ok(())
    }

    fn train_on(&mut self, record: &Record, weight: f64) -> Result<()> {
        if let Some(class) = record.label().as_nominal() {
            match self.class_weights.get_mut(class) {
                Some(w) => *w += weight,
                None => bail!("class index {} out of range for majority learner", class),
            }
        }
        Ok(())
    }

    fn predict(&self, _record: &Record) -> Result<Prediction> {
        if self.class_weights.is_empty() {
            bail!("majority learner used before configure");
        }
        Ok(Prediction::Class(max_index(&self.class_weights)))
    }

    fn name(&self) -> &str {
        "majority"
    }

    fn description(&self) -> &str {
        "Predicts the class with the largest accumulated training weight"
    }

    fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Classification
    }
}

/// No-change: predicts the label of the most recent training record
#[derive(Debug, Clone, Default)]
pub struct NoChange {
    last: Option<usize>,
}

impl NoChange {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Learner for NoChange {
    fn configure(&mut self, schema: &Schema) -> Result<()> {
        class_count(schema)?;
        self.last = None;
        Ok(())
    }

    fn train_on(&mut self, record: &Record, _weight: f64) -> Result<()> {
        if let Some(class) = record.label().as_nominal() {
            self.last = Some(class);
        }
        Ok(())
    }

    fn predict(&self, _record: &Record) -> Result<Prediction> {
        Ok(Prediction::Class(self.last.unwrap_or(0)))
    }

    fn name(&self) -> &str {
        "no-change"
    }

    fn description(&self) -> &str {
        "Repeats the label of the most recent training record"
    }

    fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Classification
    }
}

/// Weighted running mean and variance (West's incremental algorithm)
#[derive(Debug, Clone, Default)]
struct GaussianEstimator {
    weight_sum: f64,
    mean: f64,
    m2: f64,
}

impl GaussianEstimator {
    const MIN_VARIANCE: f64 = 1e-6;

    fn add(&mut self, value: f64, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        self.weight_sum += weight;
        let delta = value - self.mean;
        self.mean += delta * weight / self.weight_sum;
        self.m2 += weight * delta * (value - self.mean);
    }

    fn log_density(&self, value: f64) -> f64 {
        if self.weight_sum <= 0.0 {
            return 0.0;
        }
        let variance = (self.m2 / self.weight_sum).max(Self::MIN_VARIANCE);
        let diff = value - self.mean;
        -0.5 * (2.0 * std::f64::consts::PI * variance).ln() - diff * diff / (2.0 * variance)
    }
}

#[derive(Debug, Clone)]
enum AttributeModel {
    /// Per class, per declared value: accumulated weight
    Nominal(Vec<Vec<f64>>),
    /// Per class estimator
    Numeric(Vec<GaussianEstimator>),
    /// The label position
    Label,
}

/// Naive Bayes with Laplace-smoothed nominal counts and Gaussian numerics
#[derive(Debug, Clone, Default)]
pub struct NaiveBayes {
    class_weights: Vec<f64>,
    attributes: Vec<AttributeModel>,
}

impl NaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    fn total_weight(&self) -> f64 {
        self.class_weights.iter().sum()
    }
}

impl Learner for NaiveBayes {
    fn configure(&mut self, schema: &Schema) -> Result<()> {
        let classes = class_count(schema)?;
        self.class_weights = vec![0.0; classes];
        self.attributes = schema
            .attributes
            .iter()
            .enumerate()
            .map(|(idx, attr)| {
                if idx == schema.label_index {
                    return AttributeModel::Label;
                }
                match &attr.kind {
                    AttributeKind::Nominal(values) => AttributeModel::Nominal(vec![vec![0.0; values.len()]; classes]),
                    AttributeKind::Numeric => AttributeModel::Numeric(vec![GaussianEstimator::default(); classes]),
                }
            })
            .collect();
        Ok(())
    }

    fn train_on(&mut self, record: &Record, weight: f64) -> Result<()> {
        let class = match record.label().as_nominal() {
            Some(class) if class < self.class_weights.len() => class,
            Some(class) => bail!("class index {} out of range for naive bayes", class),
            None => return Ok(()),
        };
        if record.len() != self.attributes.len() {
            bail!(
                "naive bayes configured for {} attributes, record has {}",
                self.attributes.len(),
                record.len()
            );
        }

        self.class_weights[class] += weight;
        for (model, value) in self.attributes.iter_mut().zip(record.values()) {
            match (model, value) {
                (AttributeModel::Nominal(counts), Value::Nominal(v)) => {
                    if let Some(slot) = counts[class].get_mut(*v) {
                        *slot += weight;
                    }
                }
                (AttributeModel::Numeric(estimators), Value::Numeric(v)) => {
                    estimators[class].add(*v, weight);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn predict(&self, record: &Record) -> Result<Prediction> {
        if self.class_weights.is_empty() {
            bail!("naive bayes used before configure");
        }
        let total = self.total_weight();
        if total <= 0.0 {
            return Ok(Prediction::Class(0));
        }

        let classes = self.class_weights.len() as f64;
        let scores: Vec<f64> = self
            .class_weights
            .iter()
            .enumerate()
            .map(|(class, class_weight)| {
                let mut score = ((class_weight + 1.0) / (total + classes)).ln();
                for (model, value) in self.attributes.iter().zip(record.values()) {
                    match (model, value) {
                        (AttributeModel::Nominal(counts), Value::Nominal(v)) => {
                            let row = &counts[class];
                            let count = row.get(*v).copied().unwrap_or(0.0);
                            score += ((count + 1.0) / (class_weight + row.len() as f64)).ln();
                        }
                        (AttributeModel::Numeric(estimators), Value::Numeric(v)) => {
                            score += estimators[class].log_density(*v);
                        }
                        _ => {}
                    }
                }
                score
            })
            .collect();

        Ok(Prediction::Class(max_index(&scores)))
    }

    fn name(&self) -> &str {
        "naive-bayes"
    }

    fn description(&self) -> &str {
        "Naive Bayes with Laplace-smoothed nominal counts and Gaussian numeric attributes"
    }

    fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Classification
    }
}

/// Target mean: predicts the weighted mean of all training labels
#[derive(Debug, Clone, Default)]
pub struct TargetMean {
    weight_sum: f64,
    mean: f64,
}

impl TargetMean {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Learner for TargetMean {
    fn configure(&mut self, schema: &Schema) -> Result<()> {
        if !schema.label().is_numeric() {
            bail!("label attribute '{}' is not numeric", schema.label().name);
        }
        self.weight_sum = 0.0;
        self.mean = 0.0;
        Ok(())
    }

    fn train_on(&mut self, record: &Record, weight: f64) -> Result<()> {
        if let Some(y) = record.label().as_numeric() {
            if weight > 0.0 {
                self.weight_sum += weight;
                self.mean += (y - self.mean) * weight / self.weight_sum;
            }
        }
        Ok(())
    }

    fn predict(&self, _record: &Record) -> Result<Prediction> {
        Ok(Prediction::Value(self.mean))
    }

    fn name(&self) -> &str {
        "target-mean"
    }

    fn description(&self) -> &str {
        "Predicts the weighted mean of every training label seen so far"
    }

    fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Regression
    }
}

/// Last value: predicts the most recent training label
#[derive(Debug, Clone, Default)]
pub struct LastValue {
    last: Option<f64>,
}

impl LastValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Learner for LastValue {
    fn configure(&mut self, schema: &Schema) -> Result<()> {
        if !schema.label().is_numeric() {
            bail!("label attribute '{}' is not numeric", schema.label().name);
        }
        self.last = None;
        Ok(())
    }

    fn train_on(&mut self, record: &Record, _weight: f64) -> Result<()> {
        if let Some(y) = record.label().as_numeric() {
            self.last = Some(y);
        }
        Ok(())
    }

    fn predict(&self, _record: &Record) -> Result<Prediction> {
        Ok(Prediction::Value(self.last.unwrap_or(0.0)))
    }

    fn name(&self) -> &str {
        "last-value"
    }

    fn description(&self) -> &str {
        "Predicts the label of the most recent training record"
    }

    fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Regression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Attribute;

    fn class_schema() -> Schema {
        Schema::new(
            "test",
            vec![
                Attribute::nominal("proto", &["tcp", "udp"]),
                Attribute::numeric("bytes"),
                Attribute::nominal("class", &["E", "M"]),
            ],
            2,
        )
        .unwrap()
    }

    fn class_record(proto: usize, bytes: f64, class: usize) -> Record {
        Record::new(vec![Value::Nominal(proto), Value::Numeric(bytes), Value::Nominal(class)], 2)
    }

    fn numeric_schema() -> Schema {
        Schema::new("test", vec![Attribute::numeric("x"), Attribute::numeric("y")], 1).unwrap()
    }

    #[test]
    fn test_majority_weighted() {
        let mut learner = MajorityClass::new();
        learner.configure(&class_schema()).unwrap();
        learner.train_on(&class_record(0, 1.0, 0), 1.0).unwrap();
        learner.train_on(&class_record(0, 1.0, 0), 1.0).unwrap();
        learner.train_on(&class_record(0, 1.0, 1), 5.0).unwrap();
        assert_eq!(learner.predict(&class_record(0, 1.0, 0)).unwrap(), Prediction::Class(1));
    }

    #[test]
    fn test_majority_requires_configure() {
        let learner = MajorityClass::new();
        assert!(learner.predict(&class_record(0, 1.0, 0)).is_err());
    }

    #[test]
    fn test_no_change() {
        let mut learner = NoChange::new();
        learner.configure(&class_schema()).unwrap();
        assert_eq!(learner.predict(&class_record(0, 1.0, 0)).unwrap(), Prediction::Class(0));
        learner.train_on(&class_record(0, 1.0, 1), 1.0).unwrap();
        assert_eq!(learner.predict(&class_record(0, 1.0, 0)).unwrap(), Prediction::Class(1));
    }

    #[test]
    fn test_naive_bayes_separates_classes() {
        let mut learner = NaiveBayes::new();
        learner.configure(&class_schema()).unwrap();

        for i in 0..20 {
            learner.train_on(&class_record(0, 100.0 + i as f64, 0), 1.0).unwrap();
            learner.train_on(&class_record(1, 5000.0 + i as f64, 1), 1.0).unwrap();
        }

        assert_eq!(learner.predict(&class_record(0, 105.0, 1)).unwrap(), Prediction::Class(0));
        assert_eq!(learner.predict(&class_record(1, 5010.0, 0)).unwrap(), Prediction::Class(1));
    }

    #[test]
    fn test_naive_bayes_untrained_predicts_first_class() {
        let mut learner = NaiveBayes::new();
        learner.configure(&class_schema()).unwrap();
        assert_eq!(learner.predict(&class_record(1, 1.0, 1)).unwrap(), Prediction::Class(0));
    }

    #[test]
    fn test_naive_bayes_rejects_numeric_label() {
        let mut learner = NaiveBayes::new();
        assert!(learner.configure(&numeric_schema()).is_err());
    }

    #[test]
    fn test_target_mean_weighted() {
        let mut learner = TargetMean::new();
        learner.configure(&numeric_schema()).unwrap();
        let r = |y: f64| Record::new(vec![Value::Numeric(0.0), Value::Numeric(y)], 1);
        learner.train_on(&r(2.0), 1.0).unwrap();
        learner.train_on(&r(5.0), 2.0).unwrap();
        match learner.predict(&r(0.0)).unwrap() {
            Prediction::Value(v) => assert!((v - 4.0).abs() < 1e-12),
            other => panic!("unexpected prediction {:?}", other),
        }
    }

    #[test]
    fn test_last_value() {
        let mut learner = LastValue::new();
        learner.configure(&numeric_schema()).unwrap();
        let r = |y: f64| Record::new(vec![Value::Numeric(0.0), Value::Numeric(y)], 1);
        learner.train_on(&r(7.5), 1.0).unwrap();
        assert_eq!(learner.predict(&r(0.0)).unwrap(), Prediction::Value(7.5));
    }

    #[test]
    fn test_learner_kind_from_str() {
        assert_eq!("naive-bayes".parse::<LearnerKind>().unwrap(), LearnerKind::NaiveBayes);
        assert_eq!("MAJORITY".parse::<LearnerKind>().unwrap(), LearnerKind::Majority);
        assert_eq!(
            "hoeffding".parse::<LearnerKind>().unwrap_err(),
            ConfigError::UnknownLearner("hoeffding".to_string())
        );
    }

    #[test]
    fn test_all_kinds_build() {
        for kind in LearnerKind::ALL {
            let learner = kind.build();
            assert_eq!(learner.name(), kind.name());
            assert!(!learner.description().is_empty());
            assert!(learner.supports(Mode::Classification) != learner.supports(Mode::Regression));
        }
    }
}
