//! Value parsing against declared semantic types
//!
//! Selection of the target representation is driven entirely by the
//! attribute's declared type. When a source value carries more temporal
//! precision than the target (a full timestamp flowing into a Date or Time
//! attribute) it is truncated to the relevant component under UTC, never the
//! runtime's local zone.

use crate::ingest::value::ColumnValue;
use crate::schema::{Attribute, SemanticType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;

const DATE_TIME_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

fn parse_date_time(raw: &str) -> Option<NaiveDateTime> {
    // Offset-carrying inputs normalize to UTC before the offset is dropped.
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    DATE_TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
}

fn parse_date(raw: &str, format: Option<&str>) -> Option<NaiveDate> {
    if let Some(f) = format {
        return NaiveDate::parse_from_str(raw, f).ok();
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date_time(raw).map(|dt| dt.date()))
}

fn parse_time(raw: &str, format: Option<&str>) -> Option<NaiveTime> {
    if let Some(f) = format {
        return NaiveTime::parse_from_str(raw, f).ok();
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveTime::parse_from_str(raw, "%H:%M").ok())
        .or_else(|| parse_date_time(raw).map(|dt| dt.time()))
}

fn parse_timestamp(raw: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    if let Some(f) = format {
        return NaiveDateTime::parse_from_str(raw, f).ok();
    }
    parse_date_time(raw)
}

/// Parse one raw text token for an attribute.
///
/// Tokens in `null_values` (and empty tokens) become NULL.
pub fn parse_text(
    attribute: &Attribute,
    raw: &str,
    null_values: &HashSet<String>,
) -> Result<ColumnValue, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || null_values.contains(trimmed) {
        return Ok(ColumnValue::Null);
    }
    let format = attribute.format.as_deref();

    match attribute.semantic_type {
        SemanticType::String => Ok(ColumnValue::Text(trimmed.to_string())),
        SemanticType::Integer => trimmed
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not a valid integer for {}", trimmed, attribute.name))
            .and_then(|v| {
                // The column is 32-bit INTEGER; reject overflow here so it is
                // skipped per record instead of failing the whole COPY batch.
                if i32::try_from(v).is_ok() {
                    Ok(ColumnValue::Integer(v))
                } else {
                    Err(format!(
                        "'{}' overflows the integer range for {}",
                        trimmed, attribute.name
                    ))
                }
            }),
        SemanticType::Decimal => Decimal::from_str(trimmed)
            .map(ColumnValue::Decimal)
            .map_err(|_| format!("'{}' is not a valid decimal for {}", trimmed, attribute.name)),
        SemanticType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Ok(ColumnValue::Boolean(true)),
            "false" => Ok(ColumnValue::Boolean(false)),
            _ => Err(format!(
                "'{}' is not a valid boolean for {}",
                trimmed, attribute.name
            )),
        },
        SemanticType::Date => parse_date(trimmed, format)
            .map(ColumnValue::Date)
            .ok_or_else(|| format!("'{}' is not a valid date for {}", trimmed, attribute.name)),
        SemanticType::Time => parse_time(trimmed, format)
            .map(ColumnValue::Time)
            .ok_or_else(|| format!("'{}' is not a valid time for {}", trimmed, attribute.name)),
        SemanticType::DateTime | SemanticType::Instant => parse_timestamp(trimmed, format)
            .map(ColumnValue::Timestamp)
            .ok_or_else(|| {
                format!("'{}' is not a valid timestamp for {}", trimmed, attribute.name)
            }),
    }
}

/// Parse one JSON value for an attribute.
pub fn parse_json(
    attribute: &Attribute,
    value: &Value,
    null_values: &HashSet<String>,
) -> Result<ColumnValue, String> {
    match value {
        Value::Null => Ok(ColumnValue::Null),
        Value::String(s) => parse_text(attribute, s, null_values),
        Value::Bool(b) => match attribute.semantic_type {
            SemanticType::Boolean => Ok(ColumnValue::Boolean(*b)),
            SemanticType::String => Ok(ColumnValue::Text(b.to_string())),
            _ => Err(format!(
                "boolean value cannot populate {} attribute {}",
                type_label(attribute.semantic_type),
                attribute.name
            )),
        },
        Value::Number(n) => match attribute.semantic_type {
            SemanticType::Integer => n
                .as_i64()
                .filter(|v| i32::try_from(*v).is_ok())
                .map(ColumnValue::Integer)
                .ok_or_else(|| {
                    format!("'{}' is not a valid integer for {}", n, attribute.name)
                }),
            // Parse the number's textual form so no float round-trip occurs.
            SemanticType::Decimal => Decimal::from_str(&n.to_string())
                .map(ColumnValue::Decimal)
                .map_err(|_| format!("'{}' is not a valid decimal for {}", n, attribute.name)),
            SemanticType::String => Ok(ColumnValue::Text(n.to_string())),
            _ => Err(format!(
                "numeric value cannot populate {} attribute {}",
                type_label(attribute.semantic_type),
                attribute.name
            )),
        },
        Value::Array(_) | Value::Object(_) => Err(format!(
            "nested value cannot populate scalar attribute {}",
            attribute.name
        )),
    }
}

fn type_label(semantic_type: SemanticType) -> &'static str {
    match semantic_type {
        SemanticType::String => "string",
        SemanticType::Integer => "integer",
        SemanticType::Decimal => "decimal",
        SemanticType::Boolean => "boolean",
        SemanticType::Date => "date",
        SemanticType::Time => "time",
        SemanticType::DateTime => "datetime",
        SemanticType::Instant => "instant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(semantic_type: SemanticType) -> Attribute {
        Attribute::new("field", semantic_type)
    }

    fn no_nulls() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn timestamp_downcasts_to_date_component() {
        let value = parse_text(&attr(SemanticType::Date), "2013-06-30T00:00:00", &no_nulls());
        assert_eq!(
            value,
            Ok(ColumnValue::Date(NaiveDate::from_ymd_opt(2013, 6, 30).unwrap()))
        );
    }

    #[test]
    fn timestamp_downcasts_to_time_component() {
        let value = parse_text(&attr(SemanticType::Time), "2013-06-30T00:00:00", &no_nulls());
        assert_eq!(
            value,
            Ok(ColumnValue::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap()))
        );
    }

    #[test]
    fn offset_timestamps_truncate_under_utc_not_local() {
        // 2013-06-30T23:30:00-03:00 is 2013-07-01T02:30:00 UTC.
        let value = parse_text(
            &attr(SemanticType::Date),
            "2013-06-30T23:30:00-03:00",
            &no_nulls(),
        );
        assert_eq!(
            value,
            Ok(ColumnValue::Date(NaiveDate::from_ymd_opt(2013, 7, 1).unwrap()))
        );
    }

    #[test]
    fn space_separated_timestamps_parse() {
        let value = parse_text(
            &attr(SemanticType::DateTime),
            "1900-01-01 11:12:13",
            &no_nulls(),
        );
        let expected = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(11, 12, 13)
            .unwrap();
        assert_eq!(value, Ok(ColumnValue::Timestamp(expected)));
    }

    #[test]
    fn custom_format_overrides_iso() {
        let attribute = attr(SemanticType::Date).with_format("%d/%m/%Y");
        let value = parse_text(&attribute, "30/06/2013", &no_nulls());
        assert_eq!(
            value,
            Ok(ColumnValue::Date(NaiveDate::from_ymd_opt(2013, 6, 30).unwrap()))
        );
    }

    #[test]
    fn integer_beyond_column_range_is_rejected() {
        // 3000000000 parses as i64 but cannot fit an INTEGER column.
        let value = parse_text(&attr(SemanticType::Integer), "3000000000", &no_nulls());
        assert!(value.is_err());

        let number: Value = serde_json::from_str("3000000000").unwrap();
        assert!(parse_json(&attr(SemanticType::Integer), &number, &no_nulls()).is_err());

        assert_eq!(
            parse_text(&attr(SemanticType::Integer), "2147483647", &no_nulls()),
            Ok(ColumnValue::Integer(2147483647))
        );
    }

    #[test]
    fn malformed_decimal_is_an_error_not_a_panic() {
        let value = parse_text(&attr(SemanticType::Decimal), "6,186.08x", &no_nulls());
        assert!(value.is_err());
    }

    #[test]
    fn null_tokens_and_empty_become_null() {
        let mut nulls = HashSet::new();
        nulls.insert("N/A".to_string());
        assert_eq!(
            parse_text(&attr(SemanticType::Decimal), "N/A", &nulls),
            Ok(ColumnValue::Null)
        );
        assert_eq!(
            parse_text(&attr(SemanticType::Decimal), "  ", &nulls),
            Ok(ColumnValue::Null)
        );
    }

    #[test]
    fn json_numbers_keep_decimal_exactness() {
        let number: Value = serde_json::from_str("6186.08").unwrap();
        let value = parse_json(&attr(SemanticType::Decimal), &number, &no_nulls()).unwrap();
        assert_eq!(
            value,
            ColumnValue::Decimal(Decimal::from_str("6186.08").unwrap())
        );
    }

    #[test]
    fn json_nested_values_are_rejected_for_scalars() {
        let nested: Value = serde_json::from_str(r#"{"a": 1}"#).unwrap();
        assert!(parse_json(&attr(SemanticType::String), &nested, &no_nulls()).is_err());
    }
}
