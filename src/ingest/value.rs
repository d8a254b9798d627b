//! Typed column values and row tuples

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;

/// A single typed cell value, aligned to the SQL type of its column.
///
/// Temporal variants are kept distinct so date-only, time-only, and full
/// timestamp representations survive to the wire unambiguously.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// JSON projection used by read paths and diagnostics.
    pub fn to_json(&self) -> Value {
        match self {
            ColumnValue::Null => Value::Null,
            ColumnValue::Text(s) => Value::String(s.clone()),
            ColumnValue::Integer(i) => Value::Number((*i).into()),
            ColumnValue::Decimal(d) => Value::String(d.to_string()),
            ColumnValue::Boolean(b) => Value::Bool(*b),
            ColumnValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            ColumnValue::Time(t) => Value::String(t.format("%H:%M:%S").to_string()),
            ColumnValue::Timestamp(ts) => {
                Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

/// One ordered tuple of values, positionally aligned to
/// `TableDescriptor::columns` minus the trailing message-id column.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestionRow {
    /// Zero-based index of the source record this row came from.
    pub record_index: u64,
    pub values: Vec<ColumnValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn json_projection_keeps_temporal_shapes_distinct() {
        let date = ColumnValue::Date(NaiveDate::from_ymd_opt(2013, 6, 30).unwrap());
        let time = ColumnValue::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(date.to_json(), Value::String("2013-06-30".to_string()));
        assert_eq!(time.to_json(), Value::String("00:00:00".to_string()));
    }

    #[test]
    fn decimal_projects_as_exact_string() {
        let value = ColumnValue::Decimal(Decimal::from_str("6186.08").unwrap());
        assert_eq!(value.to_json(), Value::String("6186.08".to_string()));
    }
}
