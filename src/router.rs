// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Test/train routing by marker attribute
//!
//! The router reads the marker value of each record, drops the marker
//! column and hands back a record the learner can consume directly.

use crate::error::ConfigError;
use crate::record::{Attribute, Marker, Record, Schema, Value};

/// Where a record goes next
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Score the record; marker already removed
    Test(Record),
    /// Train on the record; marker already removed
    Train(Record),
    /// Marker matched neither literal
    Invalid { marker: String },
}

/// Classifies records by their marker attribute
#[derive(Debug, Clone)]
pub struct Router {
    marker_index: usize,
    marker_attribute: Attribute,
    test_literal: String,
    train_literal: String,
    stripped: Schema,
}

impl Router {
    /// Build a router over `schema`; `marker_index` defaults to the last attribute
    pub fn new(schema: &Schema, marker_index: Option<usize>) -> Result<Self, ConfigError> {
        let count = schema.num_attributes();
        let marker_index = marker_index.unwrap_or(count.saturating_sub(1));

        if marker_index >= count {
            return Err(ConfigError::MarkerOutOfRange {
                index: marker_index,
                count,
            });
        }
        if marker_index == schema.label_index {
            return Err(ConfigError::MarkerIsLabel(marker_index));
        }

        Ok(Self {
            marker_index,
            marker_attribute: schema.attributes[marker_index].clone(),
            test_literal: Marker::TEST_LITERAL.to_string(),
            train_literal: Marker::TRAIN_LITERAL.to_string(),
            stripped: schema.without(marker_index),
        })
    }

    /// Replace the marker literals (matching stays case-insensitive)
    pub fn with_literals(mut self, test: &str, train: &str) -> Self {
        self.test_literal = test.to_string();
        self.train_literal = train.to_string();
        self
    }

    pub fn marker_index(&self) -> usize {
        self.marker_index
    }

    /// Schema of the records this router emits
    pub fn stripped_schema(&self) -> &Schema {
        &self.stripped
    }

    /// Route one record, consuming it
    pub fn route(&self, record: Record) -> Route {
        let (marker, record) = record.split_off(self.marker_index);
        let raw = self.marker_text(&marker);

        match Marker::parse_with(&raw, &self.test_literal, &self.train_literal) {
            Some(Marker::Test) => Route::Test(record),
            Some(Marker::Train) => Route::Train(record),
            None => Route::Invalid { marker: raw },
        }
    }

    fn marker_text(&self, value: &Value) -> String {
        match value {
            Value::Missing => String::new(),
            other => self.marker_attribute.render(other),
        }
    }
}
