// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Record streams feeding the evaluation loop
//!
//! Provides:
//! - `RecordStream`, the pull interface the loop consumes
//! - `ArffStream`, a reader for dense ARFF files
//! - `MemoryStream`, for pre-built records and seeded synthetic data

use crate::error::EvalError;
use crate::record::{Attribute, AttributeKind, Record, Schema, Value};
use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Ordered source of records sharing one schema
pub trait RecordStream {
    /// Schema of every record this stream yields (marker included)
    fn schema(&self) -> &Schema;

    /// Next record in arrival order, or `None` once exhausted
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Strip one layer of matching single or double quotes
fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Split `@attribute <name> <type>` into name and type text
fn split_attribute(rest: &str) -> Option<(String, &str)> {
    let rest = rest.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"');
    match quote {
        Some(q) => {
            let end = rest[1..].find(q)? + 1;
            Some((rest[1..end].to_string(), rest[end + 1..].trim()))
        }
        None => {
            let end = rest.find(char::is_whitespace)?;
            Some((rest[..end].to_string(), rest[end..].trim()))
        }
    }
}

fn parse_attribute(line: usize, rest: &str) -> Result<Attribute, EvalError> {
    let (name, kind) = split_attribute(rest).ok_or_else(|| EvalError::Syntax {
        line,
        reason: format!("malformed attribute declaration '{}'", rest.trim()),
    })?;

    if kind.starts_with('{') {
        let inner = kind
            .strip_prefix('{')
            .and_then(|k| k.strip_suffix('}'))
            .ok_or_else(|| EvalError::Syntax {
                line,
                reason: format!("unterminated value set for attribute '{}'", name),
            })?;
        let values = inner
            .split(',')
            .map(|v| unquote(v).to_string())
            .filter(|v| !v.is_empty())
            .collect();
        return Ok(Attribute {
            name,
            kind: AttributeKind::Nominal(values),
        });
    }

    match kind.to_ascii_lowercase().as_str() {
        "numeric" | "real" | "integer" => Ok(Attribute {
            name,
            kind: AttributeKind::Numeric,
        }),
        other => Err(EvalError::Syntax {
            line,
            reason: format!("unsupported type '{}' for attribute '{}'", other, name),
        }),
    }
}

/// Dense ARFF reader
pub struct ArffStream<R: Read> {
    schema: Schema,
    reader: csv::Reader<BufReader<R>>,
    row: csv::StringRecord,
    header_lines: usize,
}

impl ArffStream<File> {
    /// Open an ARFF file.
    ///
    /// `label_index` defaults to the second-to-last attribute when the file
    /// carries a marker column, otherwise to the last one.
    pub fn open(path: &Path, label_index: Option<usize>, has_marker: bool) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open ARFF file: {}", path.display()))?;
        Self::from_reader(file, label_index, has_marker)
            .with_context(|| format!("Failed to read ARFF header in {}", path.display()))
    }
}

impl<R: Read> ArffStream<R> {
    pub fn from_reader(input: R, label_index: Option<usize>, has_marker: bool) -> Result<Self> {
        let mut input = BufReader::new(input);
        let mut relation = String::new();
        let mut attributes = Vec::new();
        let mut header_lines = 0;
        let mut line = String::new();
        let mut in_data = false;

        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            header_lines += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                continue;
            }

            let lower = trimmed.to_ascii_lowercase();
            if lower.starts_with("@relation") {
                relation = unquote(&trimmed["@relation".len()..]).to_string();
            } else if lower.starts_with("@attribute") {
                attributes.push(parse_attribute(header_lines, &trimmed["@attribute".len()..])?);
            } else if lower.starts_with("@data") {
                in_data = true;
                break;
            } else {
                return Err(EvalError::Syntax {
                    line: header_lines,
                    reason: format!("unexpected header line '{}'", trimmed),
                }
                .into());
            }
        }

        if !in_data {
            return Err(EvalError::Syntax {
                line: header_lines,
                reason: "missing @data section".to_string(),
            }
            .into());
        }

        let reserved = if has_marker { 2 } else { 1 };
        if attributes.len() < reserved {
            return Err(EvalError::Syntax {
                line: header_lines,
                reason: format!("expected at least {} attributes, found {}", reserved, attributes.len()),
            }
            .into());
        }
        let label_index = label_index.unwrap_or(attributes.len() - reserved);
        let schema = Schema::new(&relation, attributes, label_index)?;

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'%'))
            .quote(b'\'')
            .trim(csv::Trim::All)
            .from_reader(input);

        tracing::debug!(
            "ARFF relation '{}': {} attributes, label '{}'",
            schema.relation,
            schema.num_attributes(),
            schema.label().name
        );

        Ok(Self {
            schema,
            reader,
            row: csv::StringRecord::new(),
            header_lines,
        })
    }

    fn parse_row(&self, line: usize) -> Result<Record, EvalError> {
        if self.row.get(0).map_or(false, |f| f.starts_with('{')) {
            return Err(EvalError::Syntax {
                line,
                reason: "sparse rows are not supported".to_string(),
            });
        }
        if self.row.len() != self.schema.num_attributes() {
            return Err(EvalError::Arity {
                line,
                expected: self.schema.num_attributes(),
                found: self.row.len(),
            });
        }

        let mut values = Vec::with_capacity(self.row.len());
        for (field, attribute) in self.row.iter().zip(&self.schema.attributes) {
            let field = unquote(field);
            if field == "?" {
                values.push(Value::Missing);
                continue;
            }
            let value = match &attribute.kind {
                AttributeKind::Numeric => field.parse::<f64>().map(Value::Numeric).map_err(|_| EvalError::Syntax {
                    line,
                    reason: format!("'{}' is not numeric for attribute '{}'", field, attribute.name),
                })?,
                AttributeKind::Nominal(_) => attribute
                    .index_of(field)
                    .map(Value::Nominal)
                    .ok_or_else(|| EvalError::UndeclaredValue {
                        line,
                        attribute: attribute.name.clone(),
                        value: field.to_string(),
                    })?,
            };
            values.push(value);
        }

        Ok(Record::new(values, self.schema.label_index))
    }
}

impl<R: Read> RecordStream for ArffStream<R> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let more = self
                .reader
                .read_record(&mut self.row)
                .with_context(|| format!("Failed to read data after line {}", self.header_lines))?;
            if !more {
                return Ok(None);
            }
            // Blank lines come back as a single empty field
            if self.row.len() == 1 && self.row.get(0).map_or(true, str::is_empty) {
                continue;
            }
            let line = self.header_lines + self.row.position().map_or(0, |p| p.line() as usize);
            return Ok(Some(self.parse_row(line)?));
        }
    }
}

/// In-memory stream over pre-built records
#[derive(Debug, Clone)]
pub struct MemoryStream {
    schema: Schema,
    records: VecDeque<Record>,
}

impl MemoryStream {
    pub fn new(schema: Schema, records: Vec<Record>) -> Self {
        Self {
            schema,
            records: records.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seeded two-class stream with a `T` / `F` / `X` marker column.
    ///
    /// Schema: `size` (numeric), `proto` {tcp, udp}, `class` {E, M},
    /// `train` {T, F, X}. About 30% of records are class `M`, half of
    /// the markers are `T` and 2% are the invalid `X`.
    pub fn synthetic(size: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let attributes = vec![
            Attribute::numeric("size"),
            Attribute::nominal("proto", &["tcp", "udp"]),
            Attribute::nominal("class", &["E", "M"]),
            Attribute::nominal("train", &["T", "F", "X"]),
        ];
        let schema = Schema {
            relation: "synthetic".to_string(),
            attributes,
            label_index: 2,
        };

        let records = (0..size)
            .map(|_| {
                let positive = rng.gen_bool(0.3);
                let size = if positive {
                    rng.gen_range(4.0..10.0)
                } else {
                    rng.gen_range(0.0..6.0)
                };
                let proto = if rng.gen_bool(if positive { 0.7 } else { 0.3 }) { 1 } else { 0 };
                let marker = if rng.gen_bool(0.02) {
                    2
                } else if rng.gen_bool(0.5) {
                    0
                } else {
                    1
                };
                Record::new(
                    vec![
                        Value::Numeric(size),
                        Value::Nominal(proto),
                        Value::Nominal(usize::from(positive)),
                        Value::Nominal(marker),
                    ],
                    2,
                )
            })
            .collect();

        Self::new(schema, records)
    }
}

impl RecordStream for MemoryStream {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.pop_front())
    }
}
