// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training sample weights
//!
//! Implements:
//! - Default weighting (every record weighs 1.0)
//! - Constant weighting (fixed positive / negative weights)
//! - Inverse-proportional weighting (online class rebalancing)

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Weighting scheme, chosen once per run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Weighting {
    /// Constant weight 1.0
    #[default]
    Default,
    /// Fixed weight per class
    Constant { positive: f64, negative: f64 },
    /// Base weight per class, shrunk as that class dominates the training history
    InverseProportional { positive: f64, negative: f64 },
}

impl Weighting {
    /// Build from a scheme name and optional weights.
    ///
    /// `constant` needs both weights; `inverse-proportional` falls back to a
    /// base weight of 1.0 for any weight left out.
    pub fn from_options(name: &str, positive: Option<f64>, negative: Option<f64>) -> Result<Self, ConfigError> {
        let weighting = match name.to_ascii_lowercase().as_str() {
            "default" | "none" => Weighting::Default,
            "constant" => match (positive, negative) {
                (Some(positive), Some(negative)) => Weighting::Constant { positive, negative },
                _ => return Err(ConfigError::MissingWeights("constant")),
            },
            "inverse-proportional" | "inverse" => Weighting::InverseProportional {
                positive: positive.unwrap_or(1.0),
                negative: negative.unwrap_or(1.0),
            },
            other => return Err(ConfigError::UnknownWeighting(other.to_string())),
        };
        weighting.validate()?;
        Ok(weighting)
    }

    /// Weights must be positive and finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Weighting::Default => Ok(()),
            Weighting::Constant { positive, negative }
            | Weighting::InverseProportional { positive, negative } => {
                check_weight("positive", positive)?;
                check_weight("negative", negative)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Weighting::Default => "default",
            Weighting::Constant { .. } => "constant",
            Weighting::InverseProportional { .. } => "inverse-proportional",
        }
    }
}

fn check_weight(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { name, value })
    }
}

/// Stateful weight assignment for the training path
#[derive(Debug, Clone)]
pub struct WeightPolicy {
    weighting: Weighting,
    positives: u64,
    negatives: u64,
}

impl WeightPolicy {
    pub fn new(weighting: Weighting) -> Result<Self, ConfigError> {
        weighting.validate()?;
        Ok(Self {
            weighting,
            positives: 0,
            negatives: 0,
        })
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Positive training records seen so far
    pub fn positives(&self) -> u64 {
        self.positives
    }

    /// Negative training records seen so far
    pub fn negatives(&self) -> u64 {
        self.negatives
    }

    /// Count one training record of the given class and return its weight
    pub fn weight(&mut self, is_positive: bool) -> f64 {
        if is_positive {
            self.positives += 1;
        } else {
            self.negatives += 1;
        }

        match self.weighting {
            Weighting::Default => 1.0,
            Weighting::Constant { positive, negative } => {
                if is_positive {
                    positive
                } else {
                    negative
                }
            }
            Weighting::InverseProportional { positive, negative } => {
                let (base, this, other) = if is_positive {
                    (positive, self.positives, self.negatives)
                } else {
                    (negative, self.negatives, self.positives)
                };
                // First record of a class always gets the full base weight
                if this == 1 {
                    return base;
                }
                let this = this as f64;
                let other = other as f64;
                base - (base * this / (this + other))
            }
        }
    }
}
