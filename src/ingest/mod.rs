//! Format-specific record sources and the ingestion pipeline
//!
//! A source turns raw bytes into typed rows against a versioned type;
//! the orchestrator drives sources through bulk load and reconciliation.

pub mod csv;
pub mod json;
pub mod orchestrator;
pub mod parse;
pub mod sink;
pub mod spill;
pub mod value;

use crate::error::Result;
use crate::ingest::value::IngestionRow;

pub use orchestrator::{IngestionOrchestrator, IngestionOutcome};
pub use sink::{ErrorSink, ParseFailure};

/// Pull-based row producer. Finite and not restartable: once `next_row`
/// returns `Ok(None)` the source is exhausted. Malformed records are
/// reported to the source's error sink and skipped rather than surfaced
/// here; an `Err` means the stream itself is broken.
pub trait RecordSource: Send {
    fn next_row(&mut self) -> Result<Option<IngestionRow>>;
}
