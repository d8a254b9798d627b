//! CSV record source
//!
//! Pull-based, single-pass: the underlying bytes are consumed as rows are
//! pulled, so a second consumption requires a fresh source. Malformed
//! individual records are routed to the error sink and skipped; structural
//! failures (unreadable stream, bad encoding) terminate the sequence.

use crate::config::IngestionOptions;
use crate::error::{IngestError, Result};
use crate::ingest::parse::parse_text;
use crate::ingest::sink::{ErrorSink, ParseFailure};
use crate::ingest::value::IngestionRow;
use crate::ingest::RecordSource;
use crate::schema::{Accessor, VersionedType};
use csv::{Reader, ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::io::Read;

pub struct CsvRecordSource {
    reader: Reader<Box<dyn Read + Send>>,
    versioned_type: VersionedType,
    /// Resolved zero-based source column index per attribute.
    column_indexes: Vec<usize>,
    null_values: HashSet<String>,
    error_sink: ErrorSink,
    next_record_index: u64,
}

impl CsvRecordSource {
    pub fn new(
        input: Box<dyn Read + Send>,
        versioned_type: &VersionedType,
        options: &IngestionOptions,
        error_sink: ErrorSink,
    ) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(options.first_record_as_header)
            .flexible(true)
            .from_reader(input);

        let headers: Option<Vec<String>> = if options.first_record_as_header {
            let parsed = reader
                .headers()
                .map_err(|e| IngestError::Transport(format!("Failed to read CSV headers: {}", e)))?;
            Some(parsed.iter().map(|h| h.trim().to_string()).collect())
        } else {
            None
        };

        let column_indexes = resolve_columns(versioned_type, headers.as_deref())?;

        Ok(Self {
            reader,
            versioned_type: versioned_type.clone(),
            column_indexes,
            null_values: options.null_values.clone(),
            error_sink,
            next_record_index: 0,
        })
    }

    fn parse_record(&self, record_index: u64, record: &StringRecord) -> Option<IngestionRow> {
        let mut values = Vec::with_capacity(self.versioned_type.attributes.len());

        for (attribute, &source_index) in self
            .versioned_type
            .attributes
            .iter()
            .zip(&self.column_indexes)
        {
            let cell = match record.get(source_index) {
                Some(cell) => cell,
                None => {
                    self.error_sink.report(ParseFailure {
                        record_index,
                        raw: record.iter().collect::<Vec<_>>().join(","),
                        message: format!(
                            "record has {} fields, attribute {} expects field {}",
                            record.len(),
                            attribute.name,
                            source_index + 1
                        ),
                    });
                    return None;
                }
            };

            match parse_text(attribute, cell, &self.null_values) {
                Ok(value) => values.push(value),
                Err(message) => {
                    self.error_sink.report(ParseFailure {
                        record_index,
                        raw: cell.to_string(),
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

impl RecordSource for CsvRecordSource {
    fn next_row(&mut self) -> Result<Option<IngestionRow>> {
        loop {
            let mut record = StringRecord::new();
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| IngestError::Transport(format!("Failed to read CSV record: {}", e)))?;
            if !more {
                return Ok(None);
            }

            let record_index = self.next_record_index;
            self.next_record_index += 1;

            if record.len() == 1 && record.get(0).map(str::trim) == Some("") {
                continue; // blank line
            }

            if let Some(row) = self.parse_record(record_index, &record) {
                return Ok(Some(row));
            }
        }
    }
}

/// Resolve each attribute to a source column, in priority order: header name
/// (case-insensitive), explicit 1-based column index accessor, declared path
/// matched against headers. Without headers, only the index accessor works.
fn resolve_columns(
    versioned_type: &VersionedType,
    headers: Option<&[String]>,
) -> Result<Vec<usize>> {
    versioned_type
        .attributes
        .iter()
        .map(|attribute| {
            if let Some(headers) = headers {
                if let Some(idx) = headers
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case(&attribute.name))
                {
                    return Ok(idx);
                }
            }
            match &attribute.accessor {
                Some(Accessor::ColumnIndex(one_based)) if *one_based >= 1 => Ok(one_based - 1),
                Some(Accessor::ColumnIndex(_)) => Err(IngestError::Mapping(format!(
                    "Attribute {} declares column index 0; indexes are 1-based",
                    attribute.name
                ))),
                Some(Accessor::Path(path)) => headers
                    .and_then(|headers| {
                        headers.iter().position(|h| h.eq_ignore_ascii_case(path))
                    })
                    .ok_or_else(|| {
                        IngestError::Mapping(format!(
                            "Attribute {} path '{}' does not match any CSV header",
                            attribute.name, path
                        ))
                    }),
                None => Err(IngestError::Mapping(format!(
                    "Attribute {} cannot be resolved to a CSV column (no matching header, no accessor)",
                    attribute.name
                ))),
            }
        })
        .collect()
}
