// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Records, attributes and schemas for labeled data streams
//!
//! A record is an ordered list of typed values. Its schema names each
//! position, declares the value set of nominal attributes and marks
//! which position holds the label.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// A single attribute value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric attribute value
    Numeric(f64),
    /// Index into the attribute's declared value set
    Nominal(usize),
    /// Missing value (`?` in the input)
    Missing,
}

impl Value {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_nominal(&self) -> Option<usize> {
        match self {
            Value::Nominal(idx) => Some(*idx),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeKind {
    Numeric,
    /// Declared value set, in declaration order
    Nominal(Vec<String>),
}

/// A named attribute in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: AttributeKind::Nominal(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    /// Declared values for nominal attributes
    pub fn values(&self) -> Option<&[String]> {
        match &self.kind {
            AttributeKind::Nominal(values) => Some(values),
            AttributeKind::Numeric => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, AttributeKind::Numeric)
    }

    /// Position of `value` in the declared value set
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values()?.iter().position(|v| v == value)
    }

    /// Render a value of this attribute as text
    pub fn render(&self, value: &Value) -> String {
        match (value, &self.kind) {
            (Value::Nominal(idx), AttributeKind::Nominal(values)) => values
                .get(*idx)
                .cloned()
                .unwrap_or_else(|| format!("#{}", idx)),
            (Value::Numeric(v), _) => v.to_string(),
            (Value::Nominal(idx), AttributeKind::Numeric) => idx.to_string(),
            (Value::Missing, _) => "?".to_string(),
        }
    }
}

/// Ordered attributes with a designated label position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub relation: String,
    pub attributes: Vec<Attribute>,
    pub label_index: usize,
}

impl Schema {
    pub fn new(relation: &str, attributes: Vec<Attribute>, label_index: usize) -> Result<Self, ConfigError> {
        if label_index >= attributes.len() {
            return Err(ConfigError::LabelOutOfRange {
                index: label_index,
                count: attributes.len(),
            });
        }
        Ok(Self {
            relation: relation.to_string(),
            attributes,
            label_index,
        })
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn label(&self) -> &Attribute {
        &self.attributes[self.label_index]
    }

    /// Declared class values when the label is nominal
    pub fn label_values(&self) -> Option<&[String]> {
        self.label().values()
    }

    /// A new schema with the attribute at `index` removed.
    ///
    /// The label position is shifted when the removed attribute precedes it.
    /// Callers must not remove the label itself.
    pub fn without(&self, index: usize) -> Schema {
        let attributes = self
            .attributes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, a)| a.clone())
            .collect();
        let label_index = if index < self.label_index {
            self.label_index - 1
        } else {
            self.label_index
        };
        Schema {
            relation: self.relation.clone(),
            attributes,
            label_index,
        }
    }
}

/// One observation from the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
    label_index: usize,
    weight: f64,
}

impl Record {
    /// Build a record with unit weight
    pub fn new(values: Vec<Value>, label_index: usize) -> Self {
        Self {
            values,
            label_index,
            weight: 1.0,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn label_index(&self) -> usize {
        self.label_index
    }

    /// Ground-truth label value
    pub fn label(&self) -> Value {
        self.values.get(self.label_index).copied().unwrap_or(Value::Missing)
    }

    /// Overwrite the label (used by the regression log transform)
    pub fn set_label(&mut self, value: Value) {
        if let Some(slot) = self.values.get_mut(self.label_index) {
            *slot = value;
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Split off the value at `index`, returning it and the remaining record.
    ///
    /// Consumes the record so no other holder can observe the removed value.
    pub fn split_off(self, index: usize) -> (Value, Record) {
        let mut values = self.values;
        let removed = if index < values.len() {
            values.remove(index)
        } else {
            Value::Missing
        };
        let label_index = if index < self.label_index {
            self.label_index - 1
        } else {
            self.label_index
        };
        (
            removed,
            Record {
                values,
                label_index,
                weight: self.weight,
            },
        )
    }
}

/// Routing marker carried by every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// Score the record (literal `F`)
    Test,
    /// Train on the record (literal `T`)
    Train,
}

impl Marker {
    pub const TEST_LITERAL: &'static str = "F";
    pub const TRAIN_LITERAL: &'static str = "T";

    /// Case-insensitive match against the default literals
    pub fn parse(raw: &str) -> Option<Self> {
        Self::parse_with(raw, Self::TEST_LITERAL, Self::TRAIN_LITERAL)
    }

    /// Case-insensitive match against caller-supplied literals
    pub fn parse_with(raw: &str, test: &str, train: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(test) {
            Some(Marker::Test)
        } else if raw.eq_ignore_ascii_case(train) {
            Some(Marker::Train)
        } else {
            None
        }
    }
}
