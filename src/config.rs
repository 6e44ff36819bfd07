// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Run configuration
//!
//! Built once (from CLI flags or a JSON file), validated against the
//! stream schema before the first record is read, then never mutated.

use crate::error::ConfigError;
use crate::learners::LearnerKind;
use crate::record::{Marker, Schema};
use crate::weighting::Weighting;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// What kind of label is being predicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Nominal label, binary confusion matrix against a positive class
    #[default]
    Classification,
    /// Numeric label, MAE / RMSE
    Regression,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Classification => f.write_str("classification"),
            Mode::Regression => f.write_str("regression"),
        }
    }
}

/// Configuration for one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub mode: Mode,
    pub learner: LearnerKind,
    /// Label value counted as positive (classification only)
    pub positive_class: Option<String>,
    /// Label position; defaults to the second-to-last attribute
    pub label_index: Option<usize>,
    /// Marker position; defaults to the last attribute
    pub marker_index: Option<usize>,
    pub test_marker: String,
    pub train_marker: String,
    pub weighting: Weighting,
    /// Classification: train only on records of this class, counting the rest as filtered
    pub normal_class: Option<String>,
    /// Regression: train only on labels strictly above this value
    pub train_threshold: Option<f64>,
    /// Regression: enables the adjusted log transform when >= 0
    pub log_min: Option<f64>,
    /// Write one CSV row per test record
    pub emit_rows: bool,
    /// Seed for synthetic streams
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Classification,
            learner: LearnerKind::NaiveBayes,
            positive_class: None,
            label_index: None,
            marker_index: None,
            test_marker: Marker::TEST_LITERAL.to_string(),
            train_marker: Marker::TRAIN_LITERAL.to_string(),
            weighting: Weighting::Default,
            normal_class: None,
            train_threshold: None,
            log_min: None,
            emit_rows: true,
            seed: 42,
        }
    }
}

impl EvaluationConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Checks that do not depend on the stream
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weighting.validate()?;

        if let Some(threshold) = self.train_threshold {
            if !threshold.is_finite() {
                return Err(ConfigError::InvalidThreshold(threshold.to_string()));
            }
        }
        if let Some(log_min) = self.log_min {
            if !log_min.is_finite() {
                return Err(ConfigError::InvalidThreshold(log_min.to_string()));
            }
        }

        match self.mode {
            Mode::Classification => {
                if self.positive_class.is_none() {
                    return Err(ConfigError::MissingPositiveClass);
                }
            }
            Mode::Regression => {
                if self.weighting != Weighting::Default {
                    return Err(ConfigError::WeightingNeedsClasses);
                }
                if self.normal_class.is_some() {
                    return Err(ConfigError::NormalClassNeedsClasses);
                }
            }
        }
        Ok(())
    }

    /// Checks against the stream schema (marker already removed or not)
    pub fn validate_schema(&self, schema: &Schema) -> Result<(), ConfigError> {
        self.validate()?;
        let label = schema.label();
        match self.mode {
            Mode::Classification if label.is_numeric() => Err(ConfigError::NumericLabel(label.name.clone())),
            Mode::Classification => {
                self.positive_class_index(schema)?;
                self.normal_class_index(schema).map(|_| ())
            }
            Mode::Regression if !label.is_numeric() => Err(ConfigError::NominalLabel(label.name.clone())),
            Mode::Regression => Ok(()),
        }
    }

    /// Index of the positive class in the label's declared values
    pub fn positive_class_index(&self, schema: &Schema) -> Result<usize, ConfigError> {
        let value = self.positive_class.as_deref().ok_or(ConfigError::MissingPositiveClass)?;
        let label = schema.label();
        let declared = label
            .values()
            .ok_or_else(|| ConfigError::NumericLabel(label.name.clone()))?;
        declared
            .iter()
            .position(|v| v == value)
            .ok_or_else(|| ConfigError::UnknownPositiveClass {
                value: value.to_string(),
                declared: declared.to_vec(),
            })
    }

    /// Index of the normal class, when training is restricted to one class
    pub fn normal_class_index(&self, schema: &Schema) -> Result<Option<usize>, ConfigError> {
        let Some(value) = self.normal_class.as_deref() else {
            return Ok(None);
        };
        let label = schema.label();
        let declared = label
            .values()
            .ok_or_else(|| ConfigError::NumericLabel(label.name.clone()))?;
        declared
            .iter()
            .position(|v| v == value)
            .map(Some)
            .ok_or_else(|| ConfigError::UnknownNormalClass {
                value: value.to_string(),
                declared: declared.to_vec(),
            })
    }
}

/// Parse a decimal threshold supplied as text
pub fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ConfigError::InvalidThreshold(raw.to_string())),
    }
}
