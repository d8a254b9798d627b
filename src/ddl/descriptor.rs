//! Physical table shapes derived from versioned types

use serde::{Deserialize, Serialize};

/// Trailing column recording which ingestion run produced a row.
pub const MESSAGE_ID_COLUMN: &str = "messageid";

/// Upper bound on generated table name length.
pub const MAX_TABLE_NAME_LENGTH: usize = 31;

/// SQL column types this store maps onto.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Varchar(usize),
    Integer,
    Numeric { precision: u8, scale: u8 },
    Boolean,
    Date,
    Time,
    Timestamp,
}

impl SqlType {
    pub fn render(&self) -> String {
        match self {
            SqlType::Varchar(size) => format!("VARCHAR({})", size),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Numeric { precision, scale } => format!("NUMERIC({},{})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_indexed: bool,
}

impl ColumnDefinition {
    /// Quoted column identifier for use in statements.
    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The derived physical shape of one versioned type.
///
/// Column order is stable and matches attribute declaration order, so row
/// tuples produced by the record sources align positionally. The message-id
/// column is always last and never part of the key set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub qualified_type_name: String,
    pub type_version: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key_columns: Vec<String>,
}

impl TableDescriptor {
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key_columns.is_empty()
    }

    /// Attribute columns, excluding the message-id column.
    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.name != MESSAGE_ID_COLUMN)
    }

    pub fn non_key_data_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.data_columns().filter(|c| !c.is_primary_key)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Structural identity: same columns (name, type, nullability) in the
    /// same order with the same key set. The table name is excluded so two
    /// versions of a type can be compared shape-to-shape.
    pub fn same_shape_as(&self, other: &TableDescriptor) -> bool {
        self.columns == other.columns && self.primary_key_columns == other.primary_key_columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("symbol"), "\"symbol\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn sql_type_rendering() {
        assert_eq!(SqlType::Varchar(255).render(), "VARCHAR(255)");
        assert_eq!(
            SqlType::Numeric { precision: 30, scale: 15 }.render(),
            "NUMERIC(30,15)"
        );
        assert_eq!(SqlType::Timestamp.render(), "TIMESTAMP");
    }
}
