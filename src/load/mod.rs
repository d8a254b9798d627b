//! Bulk loading and reconciliation

pub mod loader;
pub mod upsert;

pub use loader::{copy_statement, BulkLoader};
pub use upsert::UpsertResolver;
