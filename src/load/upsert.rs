//! Upsert resolution
//!
//! Keyless tables append directly and keep exact duplicates. Keyed tables
//! stage rows first, then merge: within one ingestion the **last** occurrence
//! of a key in stream order wins, enforced structurally by a sequence column
//! on the staging table rather than left to batch-ordering accident.

use crate::db::IngestConnection;
use crate::ddl::{quote_ident, TableDescriptor, MESSAGE_ID_COLUMN};
use crate::error::{IngestError, Result};
use itertools::Itertools;

/// Sequencing column appended to the staging relation; fills in COPY arrival
/// order and defines which duplicate wins.
const SEQ_COLUMN: &str = "decant_seq";

pub struct UpsertResolver;

impl UpsertResolver {
    pub fn staging_table_name(descriptor: &TableDescriptor) -> String {
        format!("{}_staging", descriptor.table_name)
    }

    /// Staging mirrors the target's columns but carries no constraints, so
    /// duplicate keys are representable until the merge.
    pub fn render_create_staging(descriptor: &TableDescriptor) -> Vec<String> {
        let staging = Self::staging_table_name(descriptor);
        vec![
            format!(
                "CREATE TEMP TABLE {} (LIKE {} INCLUDING DEFAULTS);",
                staging, descriptor.table_name
            ),
            format!(
                "ALTER TABLE {} ADD COLUMN {} BIGSERIAL;",
                staging, SEQ_COLUMN
            ),
        ]
    }

    pub fn render_drop_staging(descriptor: &TableDescriptor) -> String {
        format!(
            "DROP TABLE IF EXISTS {};",
            Self::staging_table_name(descriptor)
        )
    }

    /// The merge: pick the last staged row per key tuple, insert, and on
    /// conflict update every non-key column.
    pub fn render_merge(descriptor: &TableDescriptor) -> Result<String> {
        if !descriptor.has_primary_key() {
            return Err(IngestError::Reconciliation(format!(
                "table {} has no key columns; reconciliation does not apply",
                descriptor.table_name
            )));
        }

        let staging = Self::staging_table_name(descriptor);
        let keys = descriptor
            .primary_key_columns
            .iter()
            .map(|k| quote_ident(k))
            .join(", ");
        let all_columns = descriptor
            .data_columns()
            .map(|c| c.quoted_name())
            .chain(std::iter::once(quote_ident(MESSAGE_ID_COLUMN)))
            .join(", ");

        let updates = descriptor
            .non_key_data_columns()
            .map(|c| c.quoted_name())
            .chain(std::iter::once(quote_ident(MESSAGE_ID_COLUMN)))
            .map(|col| format!("{} = EXCLUDED.{}", col, col))
            .join(", ");

        Ok(format!(
            "INSERT INTO {target} ({columns})\n\
             SELECT {columns} FROM (\n\
             SELECT DISTINCT ON ({keys}) {columns}\n\
             FROM {staging}\n\
             ORDER BY {keys}, {seq} DESC\n\
             ) latest\n\
             ON CONFLICT ({keys}) DO UPDATE SET {updates};",
            target = descriptor.table_name,
            columns = all_columns,
            keys = keys,
            staging = staging,
            seq = SEQ_COLUMN,
            updates = updates,
        ))
    }

    /// Merge staged rows into the target and drop the staging relation.
    /// Returns the number of rows inserted or updated.
    pub async fn reconcile(
        conn: &mut dyn IngestConnection,
        descriptor: &TableDescriptor,
    ) -> Result<u64> {
        let merge = Self::render_merge(descriptor)?;
        let affected = conn
            .execute(&merge)
            .await
            .map_err(|e| IngestError::Reconciliation(e.to_string()))?;
        conn.execute(&Self::render_drop_staging(descriptor)).await?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::derive_table;
    use crate::schema::{Attribute, SemanticType, VersionedType};

    fn keyed_descriptor() -> TableDescriptor {
        derive_table(&VersionedType::new(
            "demo.Holding",
            "v1",
            vec![
                Attribute::new("id", SemanticType::Integer).primary_key(),
                Attribute::new("name", SemanticType::String).primary_key(),
                Attribute::new("value", SemanticType::Decimal),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn staging_has_no_constraints_and_a_sequence() {
        let descriptor = keyed_descriptor();
        let statements = UpsertResolver::render_create_staging(&descriptor);
        assert!(statements[0].contains(&format!(
            "CREATE TEMP TABLE {}_staging (LIKE {}",
            descriptor.table_name, descriptor.table_name
        )));
        assert!(statements[1].contains("BIGSERIAL"));
    }

    #[test]
    fn merge_orders_by_sequence_descending_for_last_write_wins() {
        let merge = UpsertResolver::render_merge(&keyed_descriptor()).unwrap();
        assert!(merge.contains("SELECT DISTINCT ON (\"id\", \"name\")"));
        assert!(merge.contains("ORDER BY \"id\", \"name\", decant_seq DESC"));
        assert!(merge.contains("ON CONFLICT (\"id\", \"name\") DO UPDATE SET"));
        assert!(merge.contains("\"value\" = EXCLUDED.\"value\""));
        // Key columns are never in the update list.
        assert!(!merge.contains("\"id\" = EXCLUDED.\"id\""));
    }

    #[test]
    fn merge_updates_message_id() {
        let merge = UpsertResolver::render_merge(&keyed_descriptor()).unwrap();
        assert!(merge.contains("\"messageid\" = EXCLUDED.\"messageid\""));
    }

    #[test]
    fn keyless_table_rejects_reconciliation() {
        let descriptor = derive_table(&VersionedType::new(
            "demo.Log",
            "v1",
            vec![Attribute::new("line", SemanticType::String)],
        ))
        .unwrap();
        assert!(UpsertResolver::render_merge(&descriptor).is_err());
    }
}
