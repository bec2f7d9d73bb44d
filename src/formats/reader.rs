use serde_json::Value;

use crate::error::{BridgeError, Result};

/// A single record: column name to value, in projection order
pub type Record = serde_json::Map<String, Value>;

/// Bounded group of records moved as one unit between source and sink
pub type Batch = Vec<Record>;

/// Configuration for delimited file reading and writing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl DelimitedConfig {
    /// Build from a caller supplied delimiter string
    ///
    /// Accepts a single ASCII character, a literal tab, or the escape `\t`.
    /// An empty string falls back to a comma.
    pub fn from_delimiter(delimiter: &str) -> Result<Self> {
        let delimiter_byte = match delimiter {
            "" => b',',
            "\\t" | "\t" => b'\t',
            d if d.len() == 1 && d.is_ascii() => d.as_bytes()[0],
            d => {
                return Err(BridgeError::Validation(format!(
                    "Delimiter must be a single character or \\t, got '{}'",
                    d
                )));
            }
        };

        Ok(Self {
            delimiter: delimiter_byte,
            ..Self::default()
        })
    }

    /// Delimiter as a string, used for splitting the raw header line
    pub fn delimiter_as_string(&self) -> String {
        char::from(self.delimiter).to_string()
    }
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

/// Raw text of a record value, as read from a flat file
///
/// `None` means the value is absent or null.
pub fn raw_text(value: Option<&Value>) -> Option<std::borrow::Cow<'_, str>> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(std::borrow::Cow::Borrowed(s.as_str())),
        Value::Bool(b) => Some(std::borrow::Cow::Owned(b.to_string())),
        Value::Number(n) => Some(std::borrow::Cow::Owned(n.to_string())),
        other => Some(std::borrow::Cow::Owned(other.to_string())),
    }
}
