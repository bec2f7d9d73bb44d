//! Conversion of flat-file text into values typed for a ClickHouse column
//!
//! Coercion is fail-open by default: a value that does not fit its column
//! becomes [`CoercedValue::Invalid`], is sent as `null` and is counted.
//! [`CoercionPolicy::Strict`] turns the same value into an error instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::debug;

use crate::db::schema::{Column, ColumnType};
use crate::error::{BridgeError, Result};
use crate::formats::{Record, raw_text};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", // 2025-01-01
    "%m/%d/%Y", // 01/31/2025
    "%d-%m-%Y", // 31-01-2025
    "%d/%m/%Y", // 31/01/2025
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// What to do with a value that cannot be represented in its column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CoercionPolicy {
    /// Send the value as null and count it
    #[default]
    Lenient,
    /// Fail the batch
    Strict,
}

/// Result of coercing one raw value
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null,
    Integer(i64),
    Unsigned(u64),
    /// Base-10 integer wider than 64 bits, sent quoted
    WideInteger(String),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
    /// Raw value that does not fit the column type
    Invalid(String),
}

impl CoercedValue {
    /// JSON value sent to ClickHouse. Dates use ClickHouse text formats.
    pub fn into_json(self) -> Value {
        match self {
            CoercedValue::Null | CoercedValue::Invalid(_) => Value::Null,
            CoercedValue::Integer(v) => Value::from(v),
            CoercedValue::Unsigned(v) => Value::from(v),
            CoercedValue::WideInteger(s) => Value::String(s),
            CoercedValue::Float(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
            CoercedValue::Boolean(v) => Value::Bool(v),
            CoercedValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            CoercedValue::DateTime(dt) => {
                Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            CoercedValue::Text(s) => Value::String(s),
        }
    }
}

/// Coerce a raw flat-file value for a column type
///
/// Empty or missing input is `Null` for every type, before any wrapper is
/// looked at.
pub fn coerce(raw: Option<&str>, column_type: &ColumnType) -> CoercedValue {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return CoercedValue::Null,
    };
    let invalid = || CoercedValue::Invalid(raw.to_string());

    match column_type {
        ColumnType::Nullable(inner) | ColumnType::LowCardinality(inner) => coerce(Some(raw), inner),
        ColumnType::Integer => coerce_integer(raw.trim()).unwrap_or_else(invalid),
        ColumnType::Float | ColumnType::Decimal => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map_or_else(invalid, CoercedValue::Float),
        ColumnType::Date => parse_date(raw.trim()).map_or_else(invalid, CoercedValue::Date),
        ColumnType::DateTime => {
            parse_datetime(raw.trim()).map_or_else(invalid, CoercedValue::DateTime)
        }
        ColumnType::Boolean => parse_bool(raw.trim()).map_or_else(invalid, CoercedValue::Boolean),
        ColumnType::Uuid | ColumnType::String | ColumnType::FixedString | ColumnType::Other(_) => {
            CoercedValue::Text(raw.to_string())
        }
    }
}

fn coerce_integer(raw: &str) -> Option<CoercedValue> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(CoercedValue::Integer(v));
    }
    if let Ok(v) = raw.parse::<u64>() {
        return Some(CoercedValue::Unsigned(v));
    }
    if is_decimal_integer(raw) {
        return Some(CoercedValue::WideInteger(
            raw.strip_prefix('+').unwrap_or(raw).to_string(),
        ));
    }

    // Decimal text in an integer column is truncated toward zero
    let v = raw.parse::<f64>().ok().filter(|v| v.is_finite())?.trunc();
    (v >= i64::MIN as f64 && v < i64::MAX as f64).then_some(CoercedValue::Integer(v as i64))
}

/// Optional sign followed by ASCII digits only
fn is_decimal_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| parse_datetime(raw).map(|dt| dt.date()))
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Coerce one file row into the insert shape for `columns`
///
/// Columns missing from the row are sent as null. Returns the coerced record
/// and the number of values that did not fit their column.
pub fn coerce_row(row: &Record, columns: &[&Column], policy: CoercionPolicy) -> Result<(Record, u64)> {
    let mut coerced = Record::with_capacity(columns.len());
    let mut anomalies = 0;

    for column in columns {
        let raw = raw_text(row.get(&column.name));
        let value = coerce(raw.as_deref(), &column.column_type);

        if let CoercedValue::Invalid(text) = &value {
            if policy == CoercionPolicy::Strict {
                return Err(BridgeError::Coercion {
                    column: column.name.clone(),
                    value: text.clone(),
                    column_type: column.type_name.clone(),
                });
            }
            debug!(column = %column.name, value = %text, column_type = %column.type_name, "Value does not fit column, sending null");
            anomalies += 1;
        }

        coerced.insert(column.name.clone(), value.into_json());
    }

    Ok((coerced, anomalies))
}

/// Coerce a whole batch, summing anomalies
pub fn coerce_batch(
    batch: &[Record],
    columns: &[&Column],
    policy: CoercionPolicy,
) -> Result<(Vec<Record>, u64)> {
    let mut rows = Vec::with_capacity(batch.len());
    let mut anomalies = 0;
    for row in batch {
        let (coerced, row_anomalies) = coerce_row(row, columns, policy)?;
        rows.push(coerced);
        anomalies += row_anomalies;
    }
    Ok((rows, anomalies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ty(name: &str) -> ColumnType {
        ColumnType::parse(name)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_coerce_values() {
        use CoercedValue::*;

        let test_cases = [
            (Some(""), "Int32", Null, "empty integer is null"),
            (None, "String", Null, "missing value is null"),
            (Some(""), "Nullable(Int32)", Null, "empty nullable is null"),
            (Some("42"), "Int32", Integer(42), "integer"),
            (Some("-7"), "Int64", Integer(-7), "negative integer"),
            (
                Some("18446744073709551615"),
                "UInt64",
                Unsigned(u64::MAX),
                "max unsigned",
            ),
            (
                Some("170141183460469231731687303715884105727"),
                "Int128",
                WideInteger("170141183460469231731687303715884105727".into()),
                "int128 max kept as text",
            ),
            (
                Some("-170141183460469231731687303715884105728"),
                "Int128",
                WideInteger("-170141183460469231731687303715884105728".into()),
                "int128 min kept as text",
            ),
            (
                Some("+18446744073709551616"),
                "UInt256",
                WideInteger("18446744073709551616".into()),
                "uint256 past u64 drops the plus sign",
            ),
            (Some("12a45"), "UInt256", Invalid("12a45".into()), "wide column still rejects text"),
            (Some("3.9"), "Int32", Integer(3), "decimal text truncated"),
            (Some("3.14"), "Float64", Float(3.14), "float"),
            (Some("12.50"), "Decimal(10, 2)", Float(12.5), "decimal"),
            (
                Some("abc"),
                "Nullable(Int32)",
                Invalid("abc".into()),
                "non-numeric is invalid, not an error",
            ),
            (Some("NaN"), "Float64", Invalid("NaN".into()), "nan is invalid"),
            (Some("x"), "String", Text("x".into()), "string passthrough"),
            (
                Some("  padded "),
                "FixedString(8)",
                Text("  padded ".into()),
                "fixed string keeps text",
            ),
            (
                Some("6f9619ff-8b86-d011-b42d-00cf4fc964ff"),
                "UUID",
                Text("6f9619ff-8b86-d011-b42d-00cf4fc964ff".into()),
                "uuid passthrough",
            ),
            (Some("2025-01-31"), "Date", Date(date(2025, 1, 31)), "iso date"),
            (Some("01/31/2025"), "Date32", Date(date(2025, 1, 31)), "us date"),
            (
                Some("2025-01-31 12:34:56"),
                "Date",
                Date(date(2025, 1, 31)),
                "datetime into date column",
            ),
            (
                Some("2025-01-31T12:34:56"),
                "DateTime",
                DateTime(date(2025, 1, 31).and_hms_opt(12, 34, 56).unwrap()),
                "iso datetime",
            ),
            (
                Some("2025-01-31T12:34:56+02:00"),
                "DateTime64(3)",
                DateTime(date(2025, 1, 31).and_hms_opt(10, 34, 56).unwrap()),
                "rfc3339 normalised to utc",
            ),
            (
                Some("2025-01-31"),
                "DateTime",
                DateTime(date(2025, 1, 31).and_hms_opt(0, 0, 0).unwrap()),
                "date into datetime column",
            ),
            (
                Some("yesterday"),
                "Date",
                Invalid("yesterday".into()),
                "unparseable date",
            ),
            (Some("yes"), "Bool", Boolean(true), "bool yes"),
            (Some("F"), "Bool", Boolean(false), "bool f"),
            (Some("maybe"), "Bool", Invalid("maybe".into()), "bad bool"),
            (
                Some("a"),
                "LowCardinality(String)",
                Text("a".into()),
                "low cardinality unwrapped",
            ),
            (
                Some("[1,2]"),
                "Array(Int32)",
                Text("[1,2]".into()),
                "unknown type passes through",
            ),
        ];

        for (raw, type_name, expected, description) in test_cases {
            assert_eq!(coerce(raw, &ty(type_name)), expected, "{}", description);
        }
    }

    #[test]
    fn test_into_json() {
        assert_eq!(CoercedValue::Invalid("x".into()).into_json(), Value::Null);
        assert_eq!(CoercedValue::Integer(42).into_json(), json!(42));
        assert_eq!(
            CoercedValue::WideInteger("340282366920938463463374607431768211455".into()).into_json(),
            json!("340282366920938463463374607431768211455")
        );
        assert_eq!(
            CoercedValue::Date(date(2025, 2, 3)).into_json(),
            json!("2025-02-03")
        );
        assert_eq!(
            CoercedValue::DateTime(date(2025, 2, 3).and_hms_opt(4, 5, 6).unwrap()).into_json(),
            json!("2025-02-03 04:05:06")
        );
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", "UInt32"),
            Column::new("age", "Nullable(Int32)"),
            Column::new("name", "String"),
        ]
    }

    fn row(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_coerce_row_lenient() {
        let columns = columns();
        let refs: Vec<&Column> = columns.iter().collect();
        let input = row(json!({"name": "Ann", "age": "abc", "id": "7", "extra": "dropped"}));

        let (coerced, anomalies) = coerce_row(&input, &refs, CoercionPolicy::Lenient).unwrap();
        assert_eq!(anomalies, 1);
        assert_eq!(
            Value::Object(coerced),
            json!({"id": 7, "age": null, "name": "Ann"})
        );
    }

    #[test]
    fn test_coerce_row_missing_column_is_null() {
        let columns = columns();
        let refs: Vec<&Column> = columns.iter().collect();
        let input = row(json!({"id": "1"}));

        let (coerced, anomalies) = coerce_row(&input, &refs, CoercionPolicy::Lenient).unwrap();
        assert_eq!(anomalies, 0);
        assert_eq!(
            Value::Object(coerced),
            json!({"id": 1, "age": null, "name": null})
        );
    }

    #[test]
    fn test_coerce_row_strict() {
        let columns = columns();
        let refs: Vec<&Column> = columns.iter().collect();
        let input = row(json!({"id": "1", "age": "abc", "name": "Bob"}));

        let err = coerce_row(&input, &refs, CoercionPolicy::Strict).unwrap_err();
        match err {
            BridgeError::Coercion {
                column,
                value,
                column_type,
            } => {
                assert_eq!(column, "age");
                assert_eq!(value, "abc");
                assert_eq!(column_type, "Nullable(Int32)");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_coerce_batch_sums_anomalies() {
        let columns = columns();
        let refs: Vec<&Column> = columns.iter().collect();
        let batch = vec![
            row(json!({"id": "x", "age": "1", "name": "a"})),
            row(json!({"id": "2", "age": "y", "name": "b"})),
            row(json!({"id": "3", "age": "3", "name": "c"})),
        ];

        let (rows, anomalies) = coerce_batch(&batch, &refs, CoercionPolicy::Lenient).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(anomalies, 2);
    }
}
