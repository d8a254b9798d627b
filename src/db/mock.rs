//! In-memory connection used by the unit tests
//!
//! Records every statement and COPY payload, counts closes, and can be
//! scripted to fail a given COPY call to simulate a bulk-protocol client
//! failing mid-flush.

use crate::db::connection::{ConnectionFactory, IngestConnection};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Execute(String),
    CopyIn { statement: String, rows: u64 },
}

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<MockCall>,
    pub close_count: usize,
    /// 1-based index of the COPY call that should fail, if any.
    pub fail_on_copy: Option<usize>,
    /// Substring of an execute statement that should fail, if any.
    pub fail_execute_containing: Option<String>,
    /// Scripted results for `query_text_rows`, drained in order.
    pub text_row_results: VecDeque<Vec<Vec<Option<String>>>>,
    copies_seen: usize,
}

#[derive(Clone, Default)]
pub struct MockDb {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_copy(&self, nth: usize) {
        self.state.lock().unwrap().fail_on_copy = Some(nth);
    }

    pub fn fail_execute_containing(&self, fragment: &str) {
        self.state.lock().unwrap().fail_execute_containing = Some(fragment.to_string());
    }

    pub fn push_text_rows(&self, rows: Vec<Vec<Option<String>>>) {
        self.state.lock().unwrap().text_row_results.push_back(rows);
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn copied_row_counts(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::CopyIn { rows, .. } => Some(rows),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ConnectionFactory for MockDb {
    async fn connect(&self) -> Result<Box<dyn IngestConnection>> {
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl IngestConnection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if let Some(fragment) = &state.fail_execute_containing {
            if sql.contains(fragment.as_str()) {
                return Err(IngestError::Database(format!(
                    "mock failure executing: {}",
                    sql
                )));
            }
        }
        state.calls.push(MockCall::Execute(sql.to_string()));
        Ok(0)
    }

    async fn copy_in(&mut self, statement: &str, data: Vec<u8>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.copies_seen += 1;
        if state.fail_on_copy == Some(state.copies_seen) {
            // Simulates an internal, non-I/O fault inside the bulk client.
            return Err(IngestError::Transport(
                "bulk client fault: attempt to divide by zero".to_string(),
            ));
        }
        let rows = data.iter().filter(|b| **b == b'\n').count() as u64;
        state.calls.push(MockCall::CopyIn {
            statement: statement.to_string(),
            rows,
        });
        Ok(rows)
    }

    async fn query_text_rows(&mut self, _sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.text_row_results.pop_front().unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().close_count += 1;
        Ok(())
    }
}
