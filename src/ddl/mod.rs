//! Type-to-table mapping: descriptors, DDL rendering, and evolution planning

pub mod descriptor;
pub mod evolution;
pub mod mapper;

pub use descriptor::{
    quote_ident, ColumnDefinition, SqlType, TableDescriptor, MAX_TABLE_NAME_LENGTH,
    MESSAGE_ID_COLUMN,
};
pub use evolution::{plan_evolution, ColumnMapping, ColumnSource, EvolutionPlan};
pub use mapper::{derive_table, render_create_ddl, render_drop_ddl, render_index_ddl, table_name};
