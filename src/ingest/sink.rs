//! Per-record error routing

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// One recovered per-record parse failure. Referenced by the final outcome;
/// never aborts the stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// Zero-based index of the offending source record.
    pub record_index: u64,
    /// The raw fragment that failed to parse.
    pub raw: String,
    pub message: String,
}

/// Cloneable sink shared between a record source and the orchestrator.
#[derive(Clone, Default)]
pub struct ErrorSink {
    failures: Arc<Mutex<Vec<ParseFailure>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, failure: ParseFailure) {
        tracing::warn!(
            record_index = failure.record_index,
            message = %failure.message,
            "skipping malformed record"
        );
        self.failures.lock().expect("error sink poisoned").push(failure);
    }

    pub fn len(&self) -> usize {
        self.failures.lock().expect("error sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all collected failures, leaving the sink empty.
    pub fn drain(&self) -> Vec<ParseFailure> {
        std::mem::take(&mut *self.failures.lock().expect("error sink poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_buffer() {
        let sink = ErrorSink::new();
        let clone = sink.clone();
        clone.report(ParseFailure {
            record_index: 1,
            raw: "x".to_string(),
            message: "bad".to_string(),
        });
        assert_eq!(sink.len(), 1);
        let drained = sink.drain();
        assert_eq!(drained[0].record_index, 1);
        assert!(sink.is_empty());
    }
}
