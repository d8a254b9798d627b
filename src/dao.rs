//! Pool-backed read access to ingested tables
//!
//! Queries go through the shared `PgPool`; only large result streaming
//! (`stream_all`) pins a dedicated pooled connection, because server-side
//! cursors are scoped to a transaction on one session.

use crate::ddl::{
    quote_ident, render_create_ddl, render_drop_ddl, render_index_ddl, SqlType, TableDescriptor,
};
use crate::error::{IngestError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use uuid::Uuid;

pub struct TableStore {
    pool: PgPool,
}

impl TableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the physical table and its secondary indexes. Idempotent.
    pub async fn create_table(&self, descriptor: &TableDescriptor) -> Result<()> {
        sqlx::query(&render_create_ddl(descriptor))
            .execute(&self.pool)
            .await?;
        for index in render_index_ddl(descriptor) {
            sqlx::query(&index).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn drop_table(&self, descriptor: &TableDescriptor) -> Result<()> {
        sqlx::query(&render_drop_ddl(descriptor))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn row_count(&self, descriptor: &TableDescriptor) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", descriptor.table_name);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    /// Fetch all rows where `column` equals `value`, with `value` parsed to
    /// the column's SQL type before binding. Unknown columns are rejected.
    pub async fn find_by(
        &self,
        descriptor: &TableDescriptor,
        column: &str,
        value: &str,
    ) -> Result<Vec<Map<String, Value>>> {
        let definition = descriptor.column(column).ok_or_else(|| {
            IngestError::Mapping(format!(
                "Column {} does not exist on table {}",
                column, descriptor.table_name
            ))
        })?;
        let sql = format!(
            "{} WHERE {} = $1",
            select_statement(descriptor),
            quote_ident(column)
        );

        let query = sqlx::query(&sql);
        let rows = match &definition.sql_type {
            SqlType::Integer => {
                let typed: i32 = parse_bind(column, value)?;
                query.bind(typed).fetch_all(&self.pool).await?
            }
            SqlType::Numeric { .. } => {
                let typed: Decimal = parse_bind(column, value)?;
                query.bind(typed).fetch_all(&self.pool).await?
            }
            SqlType::Boolean => {
                let typed: bool = parse_bind(column, value)?;
                query.bind(typed).fetch_all(&self.pool).await?
            }
            SqlType::Date => {
                let typed: NaiveDate = parse_bind(column, value)?;
                query.bind(typed).fetch_all(&self.pool).await?
            }
            SqlType::Time => {
                let typed: NaiveTime = parse_bind(column, value)?;
                query.bind(typed).fetch_all(&self.pool).await?
            }
            SqlType::Timestamp => {
                let typed: NaiveDateTime = parse_bind(column, value)?;
                query.bind(typed).fetch_all(&self.pool).await?
            }
            SqlType::Varchar(_) => query.bind(value).fetch_all(&self.pool).await?,
        };

        rows.iter().map(|row| row_to_json(descriptor, row)).collect()
    }

    /// Fetch all rows where `start <= column < end`, with both bounds parsed
    /// to the column's SQL type before binding.
    pub async fn find_between(
        &self,
        descriptor: &TableDescriptor,
        column: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Map<String, Value>>> {
        let definition = descriptor.column(column).ok_or_else(|| {
            IngestError::Mapping(format!(
                "Column {} does not exist on table {}",
                column, descriptor.table_name
            ))
        })?;
        let sql = range_statement(descriptor, column);

        let query = sqlx::query(&sql);
        let rows = match &definition.sql_type {
            SqlType::Integer => {
                let lo: i32 = parse_bind(column, start)?;
                let hi: i32 = parse_bind(column, end)?;
                query.bind(lo).bind(hi).fetch_all(&self.pool).await?
            }
            SqlType::Numeric { .. } => {
                let lo: Decimal = parse_bind(column, start)?;
                let hi: Decimal = parse_bind(column, end)?;
                query.bind(lo).bind(hi).fetch_all(&self.pool).await?
            }
            SqlType::Boolean => {
                let lo: bool = parse_bind(column, start)?;
                let hi: bool = parse_bind(column, end)?;
                query.bind(lo).bind(hi).fetch_all(&self.pool).await?
            }
            SqlType::Date => {
                let lo: NaiveDate = parse_bind(column, start)?;
                let hi: NaiveDate = parse_bind(column, end)?;
                query.bind(lo).bind(hi).fetch_all(&self.pool).await?
            }
            SqlType::Time => {
                let lo: NaiveTime = parse_bind(column, start)?;
                let hi: NaiveTime = parse_bind(column, end)?;
                query.bind(lo).bind(hi).fetch_all(&self.pool).await?
            }
            SqlType::Timestamp => {
                let lo: NaiveDateTime = parse_bind(column, start)?;
                let hi: NaiveDateTime = parse_bind(column, end)?;
                query.bind(lo).bind(hi).fetch_all(&self.pool).await?
            }
            SqlType::Varchar(_) => query.bind(start).bind(end).fetch_all(&self.pool).await?,
        };

        rows.iter().map(|row| row_to_json(descriptor, row)).collect()
    }

    /// Open a server-side cursor over the whole table inside its own
    /// transaction. `close` commits and returns the connection; dropping the
    /// cursor instead rolls the transaction back, so an abandoned cursor
    /// never hands a mid-transaction connection back to the pool.
    pub async fn stream_all(&self, descriptor: &TableDescriptor) -> Result<TableCursor> {
        let mut tx = self.pool.begin().await?;
        let cursor_name = format!("decant_cur_{}", Uuid::new_v4().simple());
        let declare = format!(
            "DECLARE {} NO SCROLL CURSOR FOR {}",
            cursor_name,
            select_statement(descriptor)
        );
        sqlx::query(&declare).execute(&mut *tx).await?;
        Ok(TableCursor {
            tx,
            cursor_name,
            descriptor: descriptor.clone(),
        })
    }
}

/// Projection over the descriptor's columns in declaration order.
fn select_statement(descriptor: &TableDescriptor) -> String {
    let projection = descriptor
        .columns
        .iter()
        .map(|c| c.quoted_name())
        .join(", ");
    format!("SELECT {} FROM {}", projection, descriptor.table_name)
}

/// Half-open range filter: start inclusive, end exclusive.
fn range_statement(descriptor: &TableDescriptor, column: &str) -> String {
    let quoted = quote_ident(column);
    format!(
        "{} WHERE {} >= $1 AND {} < $2",
        select_statement(descriptor),
        quoted,
        quoted
    )
}

fn parse_bind<T: FromStr>(column: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        IngestError::Mapping(format!(
            "Value '{}' cannot be parsed for column {}",
            value, column
        ))
    })
}

fn row_to_json(descriptor: &TableDescriptor, row: &PgRow) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    for (index, column) in descriptor.columns.iter().enumerate() {
        let value = match &column.sql_type {
            SqlType::Varchar(_) => row
                .try_get::<Option<String>, _>(index)?
                .map(Value::String),
            SqlType::Integer => row
                .try_get::<Option<i32>, _>(index)?
                .map(|v| Value::Number(v.into())),
            SqlType::Numeric { .. } => row
                .try_get::<Option<Decimal>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            SqlType::Boolean => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            SqlType::Date => row
                .try_get::<Option<NaiveDate>, _>(index)?
                .map(|v| Value::String(v.format("%Y-%m-%d").to_string())),
            SqlType::Time => row
                .try_get::<Option<NaiveTime>, _>(index)?
                .map(|v| Value::String(v.format("%H:%M:%S%.f").to_string())),
            SqlType::Timestamp => row
                .try_get::<Option<NaiveDateTime>, _>(index)?
                .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        };
        object.insert(column.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(object)
}

/// An open cursor scoped to its own transaction. Drop rolls back; `close`
/// is the commit path.
pub struct TableCursor {
    tx: Transaction<'static, Postgres>,
    cursor_name: String,
    descriptor: TableDescriptor,
}

impl TableCursor {
    /// Fetch up to `batch_size` further rows; an empty result means the
    /// cursor is exhausted.
    pub async fn next_batch(&mut self, batch_size: u32) -> Result<Vec<Map<String, Value>>> {
        let fetch = format!("FETCH FORWARD {} FROM {}", batch_size, self.cursor_name);
        let rows = sqlx::query(&fetch).fetch_all(&mut *self.tx).await?;
        rows.iter()
            .map(|row| row_to_json(&self.descriptor, row))
            .collect()
    }

    /// Close the cursor and commit its transaction, returning the
    /// connection to the pool.
    pub async fn close(mut self) -> Result<()> {
        let close = format!("CLOSE {}", self.cursor_name);
        sqlx::query(&close).execute(&mut *self.tx).await?;
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::derive_table;
    use crate::schema::{Attribute, SemanticType, VersionedType};

    fn descriptor() -> TableDescriptor {
        derive_table(&VersionedType::new(
            "demo.Order",
            "v1",
            vec![
                Attribute::new("symbol", SemanticType::String),
                Attribute::new("price", SemanticType::Decimal),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn select_projects_all_columns_in_order() {
        let d = descriptor();
        assert_eq!(
            select_statement(&d),
            format!(
                "SELECT \"symbol\", \"price\", \"messageid\" FROM {}",
                d.table_name
            )
        );
    }

    #[test]
    fn range_filter_is_half_open() {
        let d = descriptor();
        assert_eq!(
            range_statement(&d, "price"),
            format!(
                "SELECT \"symbol\", \"price\", \"messageid\" FROM {} WHERE \"price\" >= $1 AND \"price\" < $2",
                d.table_name
            )
        );
    }

    #[test]
    fn bind_parsing_rejects_garbage() {
        let err = parse_bind::<i32>("price", "not-a-number").unwrap_err();
        assert!(matches!(err, IngestError::Mapping(_)));
        assert_eq!(parse_bind::<i32>("price", "42").unwrap(), 42);
    }
}
