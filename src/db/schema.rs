use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::formats::Record;

/// ClickHouse column type, reduced to the families coercion cares about
///
/// Parsed once per run from the `type` field of `DESCRIBE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// `Int8` .. `Int256` and `UInt8` .. `UInt256`
    Integer,
    /// `Float32`, `Float64`
    Float,
    /// `Decimal(P, S)` and its sized aliases
    Decimal,
    /// `Date`, `Date32`
    Date,
    /// `DateTime`, `DateTime64(p)`, with or without a time zone argument
    DateTime,
    Uuid,
    String,
    FixedString,
    Boolean,
    Nullable(Box<ColumnType>),
    LowCardinality(Box<ColumnType>),
    /// Anything else (Enum, Array, Map, IPv4, ...). Values pass through.
    Other(String),
}

impl ColumnType {
    /// Parse a ClickHouse type name (case-insensitive prefix match)
    pub fn parse(type_name: &str) -> ColumnType {
        let trimmed = type_name.trim();

        if let Some(inner) = unwrap_wrapper(trimmed, "Nullable") {
            return ColumnType::Nullable(Box::new(ColumnType::parse(inner)));
        }
        if let Some(inner) = unwrap_wrapper(trimmed, "LowCardinality") {
            return ColumnType::LowCardinality(Box::new(ColumnType::parse(inner)));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("interval") {
            // Shares the "int" prefix but is not an integer column
            ColumnType::Other(trimmed.to_string())
        } else if lower.starts_with("int") || lower.starts_with("uint") {
            ColumnType::Integer
        } else if lower.starts_with("float") {
            ColumnType::Float
        } else if lower.starts_with("decimal") {
            ColumnType::Decimal
        } else if lower.starts_with("datetime") {
            ColumnType::DateTime
        } else if lower.starts_with("date") {
            ColumnType::Date
        } else if lower.starts_with("uuid") {
            ColumnType::Uuid
        } else if lower.starts_with("fixedstring") {
            ColumnType::FixedString
        } else if lower.starts_with("string") {
            ColumnType::String
        } else if lower.starts_with("bool") {
            ColumnType::Boolean
        } else {
            ColumnType::Other(trimmed.to_string())
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "Integer"),
            ColumnType::Float => write!(f, "Float"),
            ColumnType::Decimal => write!(f, "Decimal"),
            ColumnType::Date => write!(f, "Date"),
            ColumnType::DateTime => write!(f, "DateTime"),
            ColumnType::Uuid => write!(f, "UUID"),
            ColumnType::String => write!(f, "String"),
            ColumnType::FixedString => write!(f, "FixedString"),
            ColumnType::Boolean => write!(f, "Bool"),
            ColumnType::Nullable(inner) => write!(f, "Nullable({})", inner),
            ColumnType::LowCardinality(inner) => write!(f, "LowCardinality({})", inner),
            ColumnType::Other(name) => write!(f, "{}", name),
        }
    }
}

fn unwrap_wrapper<'a>(type_name: &'a str, wrapper: &str) -> Option<&'a str> {
    let prefix = type_name.get(..wrapper.len())?;
    if !prefix.eq_ignore_ascii_case(wrapper) {
        return None;
    }
    type_name[wrapper.len()..]
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// A column of a ClickHouse table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    /// Type name exactly as reported by the server
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip)]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            column_type: ColumnType::parse(&type_name),
            type_name,
        }
    }
}

/// Ordered column list of one table, fetched once per run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub columns: Vec<Column>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Build from `DESCRIBE TABLE` rows (`name`, `type`, ...)
    pub fn from_describe_rows(rows: &[Record]) -> Self {
        let columns = rows
            .iter()
            .filter_map(|row| {
                let name = name_of(row, &["name", "field"])?;
                let type_name = row.get("type").and_then(Value::as_str).unwrap_or_default();
                Some(Column::new(name, type_name))
            })
            .collect();

        Self { columns }
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Table columns that were selected, in table order
    pub fn project(&self, selected: &[String]) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| selected.iter().any(|s| s == &c.name))
            .collect()
    }
}

/// Name-like value of a metadata row
///
/// Takes the first string found under `keys`, falling back to the first
/// value of the row.
pub fn name_of(row: &Record, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            row.values().next().map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_parse_column_types() {
        use ColumnType::*;

        let test_cases = [
            ("Int32", Integer, "signed integer"),
            ("UInt64", Integer, "unsigned integer"),
            ("int8", Integer, "lower case"),
            ("Float64", Float, "float"),
            ("Decimal(18, 4)", Decimal, "decimal with precision"),
            ("Date", Date, "date"),
            ("Date32", Date, "extended date"),
            ("DateTime", DateTime, "datetime"),
            ("DateTime64(3, 'UTC')", DateTime, "datetime64 is not a date"),
            ("UUID", Uuid, "uuid"),
            ("String", String, "string"),
            ("FixedString(16)", FixedString, "fixed string"),
            ("Bool", Boolean, "boolean"),
            (
                "Nullable(Int32)",
                Nullable(Box::new(Integer)),
                "nullable integer",
            ),
            (
                "LowCardinality(Nullable(String))",
                LowCardinality(Box::new(Nullable(Box::new(String)))),
                "nested wrappers",
            ),
            (
                "IntervalSecond",
                Other("IntervalSecond".into()),
                "interval is not an integer",
            ),
            (
                "Array(Int32)",
                Other("Array(Int32)".into()),
                "array passes through",
            ),
            (
                "Enum8('a' = 1)",
                Other("Enum8('a' = 1)".into()),
                "enum passes through",
            ),
        ];

        for (input, expected, description) in test_cases {
            assert_eq!(ColumnType::parse(input), expected, "{}: {}", description, input);
        }
    }

    #[test]
    fn test_display_keeps_wrappers() {
        let ty = ColumnType::parse("LowCardinality(Nullable(String))");
        assert_eq!(ty.to_string(), "LowCardinality(Nullable(String))");
    }

    #[test]
    fn test_schema_from_describe_rows() {
        let rows = vec![
            record(json!({"name": "id", "type": "UInt64", "default_type": ""})),
            record(json!({"field": "email", "type": "Nullable(String)"})),
            record(json!({"column": "created", "type": "DateTime"})),
        ];

        let schema = ColumnSchema::from_describe_rows(&rows);
        assert_eq!(schema.names(), vec!["id", "email", "created"]);
        assert_eq!(schema.get("id").unwrap().column_type, ColumnType::Integer);
        assert_eq!(schema.get("email").unwrap().type_name, "Nullable(String)");
        assert_eq!(
            schema.get("created").unwrap().column_type,
            ColumnType::DateTime
        );
    }

    #[test]
    fn test_project_keeps_table_order() {
        let schema = ColumnSchema::new(vec![
            Column::new("id", "UInt32"),
            Column::new("name", "String"),
            Column::new("age", "Int32"),
        ]);

        let selected = vec!["age".to_string(), "id".to_string(), "missing".to_string()];
        let names: Vec<&str> = schema
            .project(&selected)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "age"]);
    }

    #[test]
    fn test_name_of_fallbacks() {
        assert_eq!(
            name_of(&record(json!({"name": "events"})), &["name", "table"]),
            Some("events".into())
        );
        assert_eq!(
            name_of(&record(json!({"table": "users"})), &["name", "table"]),
            Some("users".into())
        );
        assert_eq!(
            name_of(&record(json!({"something": "orders"})), &["name", "table"]),
            Some("orders".into())
        );
        assert_eq!(name_of(&Record::new(), &["name"]), None);
    }
}
