//! Bulk loader
//!
//! Streams rows into the store through the COPY bulk-append protocol rather
//! than per-row INSERTs. Rows accumulate into batches bounded by row count
//! or elapsed time, whichever triggers first, so both memory and latency
//! stay bounded for slow-trickling sources. Batches are flushed strictly in
//! source order.
//!
//! The timeout is checked after each pulled row, so it only matters when the
//! source itself trickles (a live socket, a paced producer). A source that
//! was fully buffered up front, as the orchestrator's spill buffer is,
//! flushes on the size bound alone.

use crate::config::IngestionOptions;
use crate::db::IngestConnection;
use crate::ddl::{quote_ident, TableDescriptor, MESSAGE_ID_COLUMN};
use crate::error::{IngestError, Result};
use crate::ingest::value::{ColumnValue, IngestionRow};
use crate::ingest::RecordSource;
use itertools::Itertools;
use std::time::Instant;

/// Render the COPY command for a target relation, covering the data columns
/// plus the trailing message-id column.
pub fn copy_statement(descriptor: &TableDescriptor, target_table: &str) -> String {
    let columns = descriptor
        .data_columns()
        .map(|c| c.quoted_name())
        .chain(std::iter::once(quote_ident(MESSAGE_ID_COLUMN)))
        .join(", ");
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
        target_table, columns
    )
}

pub struct BulkLoader {
    batch_size: usize,
    batch_timeout: std::time::Duration,
}

impl BulkLoader {
    pub fn new(options: &IngestionOptions) -> Self {
        Self {
            batch_size: options.batch_size.max(1),
            batch_timeout: options.batch_timeout,
        }
    }

    /// Pull every row from `source` and stream it into `target_table`.
    /// Returns the total row count the server accepted.
    pub async fn load(
        &self,
        conn: &mut dyn IngestConnection,
        descriptor: &TableDescriptor,
        target_table: &str,
        message_id: &str,
        source: &mut dyn RecordSource,
    ) -> Result<u64> {
        let statement = copy_statement(descriptor, target_table);
        let expected_width = descriptor.data_columns().count();

        let mut total: u64 = 0;
        let mut batch = String::new();
        let mut batch_rows: usize = 0;
        let mut batch_started = Instant::now();

        while let Some(row) = source.next_row()? {
            if row.values.len() != expected_width {
                return Err(IngestError::Transport(format!(
                    "row from record {} has {} values, table {} expects {}",
                    row.record_index,
                    row.values.len(),
                    target_table,
                    expected_width
                )));
            }

            if batch_rows == 0 {
                batch_started = Instant::now();
            }
            encode_row(&row, message_id, &mut batch);
            batch_rows += 1;

            if batch_rows >= self.batch_size || batch_started.elapsed() >= self.batch_timeout {
                total += self
                    .flush(conn, &statement, &mut batch, &mut batch_rows)
                    .await?;
            }
        }

        if batch_rows > 0 {
            total += self
                .flush(conn, &statement, &mut batch, &mut batch_rows)
                .await?;
        }

        Ok(total)
    }

    async fn flush(
        &self,
        conn: &mut dyn IngestConnection,
        statement: &str,
        batch: &mut String,
        batch_rows: &mut usize,
    ) -> Result<u64> {
        let payload = std::mem::take(batch).into_bytes();
        let rows = *batch_rows;
        *batch_rows = 0;
        let accepted = conn.copy_in(statement, payload).await?;
        tracing::debug!(rows, accepted, "flushed batch");
        Ok(accepted)
    }
}

/// Append one row in COPY csv form: NULL as an empty unquoted field, text
/// always quoted, everything else in its canonical unquoted rendering.
fn encode_row(row: &IngestionRow, message_id: &str, out: &mut String) {
    for value in &row.values {
        encode_field(value, out);
        out.push(',');
    }
    encode_field(&ColumnValue::Text(message_id.to_string()), out);
    out.push('\n');
}

fn encode_field(value: &ColumnValue, out: &mut String) {
    match value {
        ColumnValue::Null => {}
        ColumnValue::Text(s) => {
            out.push('"');
            for c in s.chars() {
                if c == '"' {
                    out.push('"');
                }
                out.push(c);
            }
            out.push('"');
        }
        ColumnValue::Integer(i) => out.push_str(&i.to_string()),
        ColumnValue::Decimal(d) => out.push_str(&d.to_string()),
        ColumnValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        ColumnValue::Date(d) => out.push_str(&d.format("%Y-%m-%d").to_string()),
        ColumnValue::Time(t) => out.push_str(&t.format("%H:%M:%S%.f").to_string()),
        ColumnValue::Timestamp(ts) => {
            out.push_str(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
    }
}
