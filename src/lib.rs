//! decant: schema-driven ingestion into Postgres
//!
//! Versioned types are mapped to physical tables, CSV and JSON streams are
//! parsed against them, and rows are bulk-loaded with COPY, with key-based
//! upsert reconciliation and additive shape evolution.

pub mod config;
pub mod dao;
pub mod db;
pub mod ddl;
pub mod error;
pub mod ingest;
pub mod load;
pub mod registry;
pub mod schema;

pub use config::IngestionOptions;
pub use error::{IngestError, Result};
pub use ingest::{IngestionOrchestrator, IngestionOutcome};
