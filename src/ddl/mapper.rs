//! Type-to-table mapping and DDL rendering

use crate::ddl::descriptor::{
    quote_ident, ColumnDefinition, SqlType, TableDescriptor, MAX_TABLE_NAME_LENGTH,
    MESSAGE_ID_COLUMN,
};
use crate::error::{IngestError, Result};
use crate::schema::{SemanticType, VersionedType};
use itertools::Itertools;

/// Derive the physical table name for a versioned type.
///
/// `<lowercased local name>_<shape hash>`, truncated to the trailing
/// `MAX_TABLE_NAME_LENGTH` characters. The hash covers only the physical
/// shape (attribute names, types, nullability, keys), so the name is stable
/// across versions until the shape actually changes.
pub fn table_name(versioned_type: &VersionedType) -> String {
    let base = format!(
        "{}_{}",
        versioned_type.local_name().to_lowercase(),
        shape_hash(versioned_type)
    );
    let sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let start = sanitized.len().saturating_sub(MAX_TABLE_NAME_LENGTH);
    sanitized[start..].to_string()
}

/// Deterministic FNV-1a hash over the shape-relevant attribute fields.
pub fn shape_hash(versioned_type: &VersionedType) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    let mut feed = |bytes: &[u8]| {
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };

    feed(versioned_type.qualified_name.as_bytes());
    for attr in &versioned_type.attributes {
        feed(b"|");
        feed(attr.name.to_lowercase().as_bytes());
        feed(format!(":{:?}:{}:{}", attr.semantic_type, attr.nullable, attr.is_primary_key).as_bytes());
    }
    format!("{:08x}", hash & 0xffff_ffff)
}

/// Map a semantic type onto its SQL column type.
///
/// Decimal maps to a fixed wide NUMERIC, never floating point. Date, Time,
/// and DateTime/Instant are three separate SQL types regardless of how the
/// source happens to represent the value.
pub fn sql_type_for(semantic_type: SemanticType) -> SqlType {
    match semantic_type {
        SemanticType::String => SqlType::Varchar(255),
        SemanticType::Integer => SqlType::Integer,
        SemanticType::Decimal => SqlType::Numeric { precision: 30, scale: 15 },
        SemanticType::Boolean => SqlType::Boolean,
        SemanticType::Date => SqlType::Date,
        SemanticType::Time => SqlType::Time,
        SemanticType::DateTime | SemanticType::Instant => SqlType::Timestamp,
    }
}

/// Pure, deterministic translation of a versioned type into a table shape.
///
/// Column order matches attribute declaration order; the message-id column is
/// appended last. A type with no attributes cannot be mapped.
pub fn derive_table(versioned_type: &VersionedType) -> Result<TableDescriptor> {
    if versioned_type.attributes.is_empty() {
        return Err(IngestError::Mapping(format!(
            "Type {} has no attributes and cannot be mapped to a table",
            versioned_type.qualified_name
        )));
    }

    let mut columns: Vec<ColumnDefinition> = versioned_type
        .attributes
        .iter()
        .map(|attr| ColumnDefinition {
            name: attr.name.to_lowercase(),
            sql_type: sql_type_for(attr.semantic_type),
            nullable: attr.nullable && !attr.is_primary_key,
            is_primary_key: attr.is_primary_key,
            is_indexed: attr.is_indexed,
        })
        .collect();

    columns.push(ColumnDefinition {
        name: MESSAGE_ID_COLUMN.to_string(),
        sql_type: SqlType::Varchar(64),
        nullable: true,
        is_primary_key: false,
        is_indexed: true,
    });

    let primary_key_columns = columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect();

    Ok(TableDescriptor {
        table_name: table_name(versioned_type),
        qualified_type_name: versioned_type.qualified_name.clone(),
        type_version: versioned_type.version.clone(),
        columns,
        primary_key_columns,
    })
}

/// Render the CREATE TABLE statement, including the primary key constraint
/// when the descriptor declares key columns.
pub fn render_create_ddl(descriptor: &TableDescriptor) -> String {
    let column_defs = descriptor
        .columns
        .iter()
        .map(|col| {
            let null_clause = if col.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", col.quoted_name(), col.sql_type.render(), null_clause)
        })
        .join(",\n");

    let pk_clause = if descriptor.has_primary_key() {
        let key_list = descriptor
            .primary_key_columns
            .iter()
            .map(|name| quote_ident(name))
            .join(", ");
        format!(
            ",\nCONSTRAINT {}_pkey PRIMARY KEY ( {} )",
            descriptor.table_name, key_list
        )
    } else {
        String::new()
    };

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}{});",
        descriptor.table_name, column_defs, pk_clause
    )
}

/// Render index statements for indexed non-key columns. The message-id index
/// is always included.
pub fn render_index_ddl(descriptor: &TableDescriptor) -> Vec<String> {
    descriptor
        .columns
        .iter()
        .filter(|col| col.is_indexed && !col.is_primary_key)
        .map(|col| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({});",
                descriptor.table_name,
                col.name,
                descriptor.table_name,
                col.quoted_name()
            )
        })
        .collect()
}

/// Idempotent drop.
pub fn render_drop_ddl(descriptor: &TableDescriptor) -> String {
    format!("DROP TABLE IF EXISTS {};", descriptor.table_name)
}
