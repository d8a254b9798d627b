//! Table registry
//!
//! Tracks which derived table shape is currently active for each qualified
//! type name, persisted in a metadata table and cached in-process. The
//! registry is an explicit value constructed once and handed to the
//! orchestrator; there is no ambient global state.

use crate::db::IngestConnection;
use crate::ddl::TableDescriptor;
use crate::error::{IngestError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

pub const METADATA_TABLE: &str = "decant_metadata";

#[derive(Default)]
pub struct TableRegistry {
    cache: Mutex<HashMap<String, TableDescriptor>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_ddl() -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             id BIGSERIAL,\n\
             table_name VARCHAR(64) NOT NULL,\n\
             qualified_name VARCHAR(255) NOT NULL,\n\
             type_version VARCHAR(64) NOT NULL,\n\
             descriptor TEXT NOT NULL,\n\
             inserted_at TIMESTAMP NOT NULL DEFAULT now()\n\
             );",
            METADATA_TABLE
        )
    }

    /// Create the metadata table if missing.
    pub async fn ensure(&self, conn: &mut dyn IngestConnection) -> Result<()> {
        conn.execute(&Self::ensure_ddl()).await?;
        Ok(())
    }

    /// The most recently recorded shape for a qualified name, if any.
    pub async fn active_shape(
        &self,
        conn: &mut dyn IngestConnection,
        qualified_name: &str,
    ) -> Result<Option<TableDescriptor>> {
        if let Some(cached) = self.cache.lock().expect("registry poisoned").get(qualified_name) {
            return Ok(Some(cached.clone()));
        }

        let sql = format!(
            "SELECT descriptor FROM {} WHERE qualified_name = {} ORDER BY id DESC LIMIT 1",
            METADATA_TABLE,
            quote_literal(qualified_name)
        );
        let rows = conn.query_text_rows(&sql).await?;
        let raw = match rows.into_iter().next().and_then(|mut r| r.pop().flatten()) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let descriptor: TableDescriptor = serde_json::from_str(&raw).map_err(|e| {
            IngestError::Database(format!(
                "corrupt descriptor metadata for {}: {}",
                qualified_name, e
            ))
        })?;
        self.cache
            .lock()
            .expect("registry poisoned")
            .insert(qualified_name.to_string(), descriptor.clone());
        Ok(Some(descriptor))
    }

    /// Record `descriptor` as the active shape for its qualified name.
    pub async fn record_shape(
        &self,
        conn: &mut dyn IngestConnection,
        descriptor: &TableDescriptor,
    ) -> Result<()> {
        let serialized = serde_json::to_string(descriptor)?;
        let sql = format!(
            "INSERT INTO {} (table_name, qualified_name, type_version, descriptor) VALUES ({}, {}, {}, {});",
            METADATA_TABLE,
            quote_literal(&descriptor.table_name),
            quote_literal(&descriptor.qualified_type_name),
            quote_literal(&descriptor.type_version),
            quote_literal(&serialized)
        );
        conn.execute(&sql).await?;
        self.cache
            .lock()
            .expect("registry poisoned")
            .insert(descriptor.qualified_type_name.clone(), descriptor.clone());
        Ok(())
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockDb;
    use crate::db::ConnectionFactory;
    use crate::ddl::derive_table;
    use crate::schema::{Attribute, SemanticType, VersionedType};

    fn descriptor() -> TableDescriptor {
        derive_table(&VersionedType::new(
            "demo.Order",
            "v1",
            vec![Attribute::new("symbol", SemanticType::String)],
        ))
        .unwrap()
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[tokio::test]
    async fn record_then_lookup_hits_the_cache() {
        let db = MockDb::new();
        let mut conn = db.connect().await.unwrap();
        let registry = TableRegistry::new();
        let descriptor = descriptor();

        registry.record_shape(&mut *conn, &descriptor).await.unwrap();
        let found = registry
            .active_shape(&mut *conn, "demo.Order")
            .await
            .unwrap();
        assert_eq!(found, Some(descriptor));
    }

    #[tokio::test]
    async fn lookup_deserializes_persisted_descriptor() {
        let db = MockDb::new();
        let descriptor = descriptor();
        db.push_text_rows(vec![vec![Some(serde_json::to_string(&descriptor).unwrap())]]);
        let mut conn = db.connect().await.unwrap();

        let registry = TableRegistry::new();
        let found = registry
            .active_shape(&mut *conn, "demo.Order")
            .await
            .unwrap();
        assert_eq!(found, Some(descriptor));
    }

    #[tokio::test]
    async fn missing_shape_is_none() {
        let db = MockDb::new();
        let mut conn = db.connect().await.unwrap();
        let registry = TableRegistry::new();
        let found = registry
            .active_shape(&mut *conn, "demo.Unknown")
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
