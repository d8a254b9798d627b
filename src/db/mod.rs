//! Database connection management
//!
//! Two surfaces: a shared pool for the read paths (DAO), and a dedicated
//! per-ingestion connection behind the `IngestConnection` trait. The trait is
//! the seam that lets the loader, upsert resolver, and orchestrator be
//! exercised without a live server.

pub mod connection;
#[cfg(test)]
pub mod mock;

pub use connection::{init_pool, ConnectionFactory, IngestConnection, PgConnectionFactory};
