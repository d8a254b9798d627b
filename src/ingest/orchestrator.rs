//! Ingestion orchestrator
//!
//! Wires mapper, record source, bulk loader, and upsert resolver together
//! for one logical stream. The orchestrator owns the database connection for
//! the whole call and closes it exactly once on every exit path; the
//! pipeline itself runs in an inner function so the single close sits at the
//! single call boundary.

use crate::config::IngestionOptions;
use crate::db::{ConnectionFactory, IngestConnection};
use crate::ddl::evolution::render_migration_dml;
use crate::ddl::{
    derive_table, plan_evolution, render_create_ddl, render_index_ddl, EvolutionPlan,
    TableDescriptor,
};
use crate::error::Result;
use crate::ingest::csv::CsvRecordSource;
use crate::ingest::json::JsonRecordSource;
use crate::ingest::sink::{ErrorSink, ParseFailure};
use crate::ingest::spill::SpillBuffer;
use crate::ingest::RecordSource;
use crate::load::{BulkLoader, UpsertResolver};
use crate::registry::TableRegistry;
use crate::schema::VersionedType;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;
use uuid::Uuid;

/// Terminal result of one ingestion call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionOutcome {
    pub rows_written: u64,
    /// Per-record parse failures that were skipped, in stream order.
    pub errors: Vec<ParseFailure>,
}

pub struct IngestionOrchestrator {
    factory: Arc<dyn ConnectionFactory>,
    registry: Arc<TableRegistry>,
    options: IngestionOptions,
}

impl IngestionOrchestrator {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        registry: Arc<TableRegistry>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            factory,
            registry,
            options,
        }
    }

    /// Derive and create the physical table for a type, applying an
    /// evolution migration when the active shape differs.
    pub async fn ensure_table(&self, versioned_type: &VersionedType) -> Result<TableDescriptor> {
        let descriptor = derive_table(versioned_type)?;
        let mut conn = self.factory.connect().await?;
        let result = self.ensure_table_on(&mut *conn, &descriptor).await;
        let close_result = conn.close().await;
        result?;
        close_result?;
        Ok(descriptor)
    }

    /// Ingest a CSV byte stream. The raw bytes are buffered (spilling to
    /// disk past the threshold) before parsing begins.
    pub async fn ingest_csv(
        &self,
        versioned_type: &VersionedType,
        input: impl Read + Send,
    ) -> Result<IngestionOutcome> {
        // Mapping problems surface before any connection is opened.
        let descriptor = derive_table(versioned_type)?;
        let buffer = SpillBuffer::from_reader(input, self.options.spill_threshold_bytes)?;
        let sink = ErrorSink::new();
        let mut source =
            CsvRecordSource::new(buffer.reader()?, versioned_type, &self.options, sink.clone())?;
        self.ingest_rows(&descriptor, &mut source, sink).await
    }

    /// Ingest a JSON byte stream (single object or array of objects).
    pub async fn ingest_json(
        &self,
        versioned_type: &VersionedType,
        input: impl Read + Send,
    ) -> Result<IngestionOutcome> {
        let descriptor = derive_table(versioned_type)?;
        let buffer = SpillBuffer::from_reader(input, self.options.spill_threshold_bytes)?;
        let sink = ErrorSink::new();
        let mut source =
            JsonRecordSource::new(buffer.reader()?, versioned_type, &self.options, sink.clone())?;
        self.ingest_rows(&descriptor, &mut source, sink).await
    }

    /// Ingest an arbitrary pre-built row source.
    pub async fn ingest(
        &self,
        versioned_type: &VersionedType,
        source: &mut dyn RecordSource,
        sink: ErrorSink,
    ) -> Result<IngestionOutcome> {
        let descriptor = derive_table(versioned_type)?;
        self.ingest_rows(&descriptor, source, sink).await
    }

    async fn ingest_rows(
        &self,
        descriptor: &TableDescriptor,
        source: &mut dyn RecordSource,
        sink: ErrorSink,
    ) -> Result<IngestionOutcome> {
        let message_id = Uuid::new_v4().to_string();
        let mut conn = self.factory.connect().await?;

        let result = self
            .run_pipeline(&mut *conn, descriptor, source, &message_id)
            .await;
        // The one place the connection is released, whatever happened above.
        let close_result = conn.close().await;

        match &result {
            Ok(rows) => tracing::info!(
                table = %descriptor.table_name,
                message_id = %message_id,
                rows_written = rows,
                "ingestion completed"
            ),
            Err(e) => tracing::warn!(
                table = %descriptor.table_name,
                message_id = %message_id,
                error = %e,
                "ingestion failed"
            ),
        }

        let rows_written = result?;
        close_result?;
        Ok(IngestionOutcome {
            rows_written,
            errors: sink.drain(),
        })
    }

    async fn run_pipeline(
        &self,
        conn: &mut dyn IngestConnection,
        descriptor: &TableDescriptor,
        source: &mut dyn RecordSource,
        message_id: &str,
    ) -> Result<u64> {
        self.ensure_table_on(conn, descriptor).await?;
        tracing::debug!(table = %descriptor.table_name, "table ensured");

        let loader = BulkLoader::new(&self.options);
        if descriptor.has_primary_key() {
            for statement in UpsertResolver::render_create_staging(descriptor) {
                conn.execute(&statement).await?;
            }
            let staging = UpsertResolver::staging_table_name(descriptor);
            let staged = loader
                .load(conn, descriptor, &staging, message_id, source)
                .await?;
            tracing::debug!(table = %descriptor.table_name, staged, "reconciling staged rows");
            UpsertResolver::reconcile(conn, descriptor).await
        } else {
            loader
                .load(conn, descriptor, &descriptor.table_name, message_id, source)
                .await
        }
    }

    async fn ensure_table_on(
        &self,
        conn: &mut dyn IngestConnection,
        descriptor: &TableDescriptor,
    ) -> Result<()> {
        self.registry.ensure(conn).await?;
        let previous = self
            .registry
            .active_shape(conn, &descriptor.qualified_type_name)
            .await?;

        conn.execute(&render_create_ddl(descriptor)).await?;
        for index in render_index_ddl(descriptor) {
            conn.execute(&index).await?;
        }

        match previous {
            None => self.registry.record_shape(conn, descriptor).await?,
            Some(previous) => match plan_evolution(&previous, descriptor) {
                EvolutionPlan::Unchanged => {}
                EvolutionPlan::Upgrade {
                    from_table,
                    to_table,
                    column_mapping,
                } => {
                    tracing::info!(
                        from = %from_table,
                        to = %to_table,
                        "applying shape upgrade before ingestion"
                    );
                    conn.execute(&render_migration_dml(&from_table, &to_table, &column_mapping))
                        .await?;
                    self.registry.record_shape(conn, descriptor).await?;
                }
            },
        }
        Ok(())
    }
}
