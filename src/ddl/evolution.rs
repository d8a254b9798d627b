//! Schema evolution planning
//!
//! When a producer publishes a new version of a type, the previously derived
//! table may no longer match. The plan describes how to materialize the new
//! shape from the old so already-ingested data survives the change.

use crate::ddl::descriptor::{quote_ident, TableDescriptor};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Where a column of the new shape gets its data during migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSource {
    /// Copied from the same-named column of the previous table.
    Copied(String),
    /// Genuinely new attribute with no previous data; materialized as NULL.
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub target_column: String,
    pub source: ColumnSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvolutionPlan {
    /// The existing table is usable as-is.
    Unchanged,
    Upgrade {
        from_table: String,
        to_table: String,
        column_mapping: Vec<ColumnMapping>,
    },
}

/// Compare two derived shapes of the same qualified type.
///
/// Shapes are `Unchanged` when column sets, types, and primary keys are
/// identical; otherwise every column of `next` is mapped to a same-named
/// column of `previous` or marked unavailable.
pub fn plan_evolution(previous: &TableDescriptor, next: &TableDescriptor) -> EvolutionPlan {
    if previous.same_shape_as(next) {
        return EvolutionPlan::Unchanged;
    }

    let column_mapping = next
        .columns
        .iter()
        .map(|col| {
            let source = match previous.column(&col.name) {
                Some(prev_col) if prev_col.sql_type == col.sql_type => {
                    ColumnSource::Copied(prev_col.name.clone())
                }
                _ => ColumnSource::Unavailable,
            };
            ColumnMapping {
                target_column: col.name.clone(),
                source,
            }
        })
        .collect();

    EvolutionPlan::Upgrade {
        from_table: previous.table_name.clone(),
        to_table: next.table_name.clone(),
        column_mapping,
    }
}

/// Render the INSERT..SELECT that carries old rows into the new table.
pub fn render_migration_dml(
    from_table: &str,
    to_table: &str,
    column_mapping: &[ColumnMapping],
) -> String {
    let targets = column_mapping
        .iter()
        .map(|m| quote_ident(&m.target_column))
        .join(", ");
    let sources = column_mapping
        .iter()
        .map(|m| match &m.source {
            ColumnSource::Copied(name) => quote_ident(name),
            ColumnSource::Unavailable => format!("null as {}", quote_ident(&m.target_column)),
        })
        .join(", ");
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {};",
        to_table, targets, sources, from_table
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::mapper::derive_table;
    use crate::schema::{Attribute, SemanticType, VersionedType};

    fn shape(version: &str, attrs: Vec<Attribute>) -> TableDescriptor {
        derive_table(&VersionedType::new("demo.Item", version, attrs)).unwrap()
    }

    #[test]
    fn identical_shapes_are_unchanged() {
        let attrs = || {
            vec![
                Attribute::new("a", SemanticType::String),
                Attribute::new("b", SemanticType::Integer),
            ]
        };
        // Different versions, identical structure.
        let v1 = shape("v1", attrs());
        let v2 = shape("v2", attrs());
        assert_eq!(plan_evolution(&v1, &v2), EvolutionPlan::Unchanged);
    }

    #[test]
    fn added_column_maps_existing_and_nulls_new() {
        let v1 = shape(
            "v1",
            vec![
                Attribute::new("a", SemanticType::String),
                Attribute::new("b", SemanticType::Integer),
            ],
        );
        let v2 = shape(
            "v2",
            vec![
                Attribute::new("a", SemanticType::String),
                Attribute::new("b", SemanticType::Integer),
                Attribute::new("c", SemanticType::Decimal),
            ],
        );

        match plan_evolution(&v1, &v2) {
            EvolutionPlan::Upgrade { from_table, to_table, column_mapping } => {
                assert_eq!(from_table, v1.table_name);
                assert_eq!(to_table, v2.table_name);
                let find = |name: &str| {
                    column_mapping
                        .iter()
                        .find(|m| m.target_column == name)
                        .unwrap()
                        .source
                        .clone()
                };
                assert_eq!(find("a"), ColumnSource::Copied("a".to_string()));
                assert_eq!(find("b"), ColumnSource::Copied("b".to_string()));
                assert_eq!(find("c"), ColumnSource::Unavailable);
            }
            other => panic!("expected Upgrade, got {:?}", other),
        }
    }

    #[test]
    fn retyped_column_is_unavailable() {
        let v1 = shape("v1", vec![Attribute::new("a", SemanticType::String)]);
        let v2 = shape("v2", vec![Attribute::new("a", SemanticType::Integer)]);
        match plan_evolution(&v1, &v2) {
            EvolutionPlan::Upgrade { column_mapping, .. } => {
                let a = column_mapping.iter().find(|m| m.target_column == "a").unwrap();
                assert_eq!(a.source, ColumnSource::Unavailable);
            }
            other => panic!("expected Upgrade, got {:?}", other),
        }
    }

    #[test]
    fn migration_dml_selects_null_for_unavailable_columns() {
        let mapping = vec![
            ColumnMapping {
                target_column: "a".to_string(),
                source: ColumnSource::Copied("a".to_string()),
            },
            ColumnMapping {
                target_column: "c".to_string(),
                source: ColumnSource::Unavailable,
            },
        ];
        let dml = render_migration_dml("item_v1", "item_v2", &mapping);
        assert_eq!(
            dml,
            "INSERT INTO item_v2 (\"a\", \"c\") SELECT \"a\", null as \"c\" FROM item_v1;"
        );
    }
}
