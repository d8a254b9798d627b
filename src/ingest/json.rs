//! JSON record source
//!
//! Accepts a single JSON object or an array of objects; each element becomes
//! one row. Nested values resolve via the attribute's dot-path accessor when
//! present, otherwise by direct field-name match.

use crate::config::IngestionOptions;
use crate::error::{IngestError, Result};
use crate::ingest::parse::parse_json;
use crate::ingest::sink::{ErrorSink, ParseFailure};
use crate::ingest::value::IngestionRow;
use crate::ingest::RecordSource;
use crate::schema::{Accessor, Attribute, VersionedType};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Read;

pub struct JsonRecordSource {
    records: std::vec::IntoIter<Value>,
    versioned_type: VersionedType,
    null_values: HashSet<String>,
    error_sink: ErrorSink,
    next_record_index: u64,
}

impl JsonRecordSource {
    pub fn new(
        input: Box<dyn Read + Send>,
        versioned_type: &VersionedType,
        options: &IngestionOptions,
        error_sink: ErrorSink,
    ) -> Result<Self> {
        let payload: Value = serde_json::from_reader(input)
            .map_err(|e| IngestError::Transport(format!("Failed to parse JSON source: {}", e)))?;

        let records = match payload {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            other => {
                return Err(IngestError::Transport(format!(
                    "JSON source must be an object or an array of objects, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(Self {
            records: records.into_iter(),
            versioned_type: versioned_type.clone(),
            null_values: options.null_values.clone(),
            error_sink,
            next_record_index: 0,
        })
    }

    fn parse_element(&self, record_index: u64, element: &Value) -> Option<IngestionRow> {
        let object = match element.as_object() {
            Some(object) => object,
            None => {
                self.error_sink.report(ParseFailure {
                    record_index,
                    raw: element.to_string(),
                    message: format!("expected a JSON object, got {}", json_kind(element)),
                });
                return None;
            }
        };

        let mut values = Vec::with_capacity(self.versioned_type.attributes.len());
        for attribute in &self.versioned_type.attributes {
            let located = locate(attribute, object);
            match parse_json(attribute, located.unwrap_or(&Value::Null), &self.null_values) {
                Ok(value) => values.push(value),
                Err(message) => {
                    self.error_sink.report(ParseFailure {
                        record_index,
                        raw: located.map(Value::to_string).unwrap_or_default(),
                        message,
                    });
                    return None;
                }
            }
        }

        Some(IngestionRow {
            record_index,
            values,
        })
    }
}

impl RecordSource for JsonRecordSource {
    fn next_row(&mut self) -> Result<Option<IngestionRow>> {
        loop {
            let element = match self.records.next() {
                Some(element) => element,
                None => return Ok(None),
            };
            let record_index = self.next_record_index;
            self.next_record_index += 1;

            if let Some(row) = self.parse_element(record_index, &element) {
                return Ok(Some(row));
            }
        }
    }
}

/// Resolve an attribute within one payload object: dot-path accessor first,
/// then the attribute's own name.
fn locate<'a>(attribute: &Attribute, object: &'a serde_json::Map<String, Value>) -> Option<&'a Value> {
    if let Some(Accessor::Path(path)) = &attribute.accessor {
        let mut current: &Value = object.get(path.split('.').next()?)?;
        for part in path.split('.').skip(1) {
            current = current.as_object()?.get(part)?;
        }
        return Some(current);
    }
    object.get(&attribute.name)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
