//! Versioned type descriptors
//!
//! The schema system owns these; this crate consumes them read-only to derive
//! physical tables and to drive parsing. Two descriptors with the same
//! qualified name but different versions are distinct entities.

use serde::{Deserialize, Serialize};

/// Semantic type of an attribute. Storage mapping is driven by this
/// declaration, never by sniffing source values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemanticType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    DateTime,
    /// A point on the UTC timeline. Stored identically to DateTime after
    /// normalizing any offset to UTC.
    Instant,
}

/// How a source record's value is located for an attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accessor {
    /// 1-based CSV column index.
    ColumnIndex(usize),
    /// Dot-separated path into a JSON object, or a CSV header name.
    Path(String),
}

/// One attribute of a versioned type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Explicit accessor; when absent the attribute resolves by its own name.
    pub accessor: Option<Accessor>,
    pub is_primary_key: bool,
    pub is_indexed: bool,
    /// chrono format string overriding the ISO-8601 default for temporal types.
    pub format: Option<String>,
    pub nullable: bool,
}

impl Attribute {
    pub fn new(name: &str, semantic_type: SemanticType) -> Self {
        Self {
            name: name.to_string(),
            semantic_type,
            accessor: None,
            is_primary_key: false,
            is_indexed: false,
            format: None,
            nullable: true,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    pub fn with_accessor(mut self, accessor: Accessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }
}

/// A named, versioned record shape as published by the schema system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedType {
    /// Fully qualified type name, e.g. `demo.orders.Order`.
    pub qualified_name: String,
    /// Version discriminator (content hash or semantic version tag).
    pub version: String,
    /// Ordered attribute list. Column order follows this order.
    pub attributes: Vec<Attribute>,
}

impl VersionedType {
    pub fn new(qualified_name: &str, version: &str, attributes: Vec<Attribute>) -> Self {
        Self {
            qualified_name: qualified_name.to_string(),
            version: version.to_string(),
            attributes,
        }
    }

    /// Unqualified type name (the segment after the last `.`).
    pub fn local_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    pub fn primary_key_attributes(&self) -> Vec<&Attribute> {
        self.attributes.iter().filter(|a| a.is_primary_key).collect()
    }
}
