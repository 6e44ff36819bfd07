// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Typed errors for configuration and stream evaluation
//!
//! Configuration errors are fatal at startup: the run never begins.
//! Evaluation errors end a run that has already started.

use thiserror::Error;

/// Problems detected before any record is read
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("class value '{value}' does not exist; declared class values are {declared:?}")]
    UnknownPositiveClass { value: String, declared: Vec<String> },

    #[error("classification mode needs a positive class value")]
    MissingPositiveClass,

    #[error("label attribute '{0}' is numeric; classification needs a nominal label")]
    NumericLabel(String),

    #[error("label attribute '{0}' is nominal; regression needs a numeric label")]
    NominalLabel(String),

    #[error("label index {index} is out of range for {count} attributes")]
    LabelOutOfRange { index: usize, count: usize },

    #[error("marker index {index} is out of range for {count} attributes")]
    MarkerOutOfRange { index: usize, count: usize },

    #[error("marker and label cannot share attribute index {0}")]
    MarkerIsLabel(usize),

    #[error("{0} weighting requires both a positive and a negative weight")]
    MissingWeights(&'static str),

    #[error("{name} weight must be a positive finite number, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("threshold '{0}' is not a number")]
    InvalidThreshold(String),

    #[error("unknown learner '{0}'")]
    UnknownLearner(String),

    #[error("unknown weighting '{0}' (expected default, constant or inverse-proportional)")]
    UnknownWeighting(String),

    #[error("regression mode only supports default weighting")]
    WeightingNeedsClasses,

    #[error("learner '{learner}' does not support {mode} mode")]
    UnsupportedMode { learner: String, mode: String },

    #[error("normal class '{value}' does not exist; declared class values are {declared:?}")]
    UnknownNormalClass { value: String, declared: Vec<String> },

    #[error("regression mode cannot restrict training to a normal class")]
    NormalClassNeedsClasses,
}

/// Failures after the run has been configured
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("evaluation loop already finished; build a new one for another run")]
    AlreadyFinished,

    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("line {line}: expected {expected} values, found {found}")]
    Arity {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: value '{value}' is not declared for attribute '{attribute}'")]
    UndeclaredValue {
        line: usize,
        attribute: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_positive_class_lists_values() {
        let err = ConfigError::UnknownPositiveClass {
            value: "E".to_string(),
            declared: vec!["M".to_string(), "N".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'E'"));
        assert!(msg.contains("\"M\""));
    }

    #[test]
    fn test_eval_error_carries_line() {
        let err = EvalError::Arity { line: 12, expected: 4, found: 3 };
        assert_eq!(err.to_string(), "line 12: expected 4 values, found 3");
    }
}
