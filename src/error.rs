//! Error taxonomy shared by every stage of the bridge

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the reader, the ClickHouse client, coercion and the pipeline
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid request parameters. Raised before any I/O.
    #[error("{0}")]
    Validation(String),

    /// ClickHouse unreachable, connection dropped, or credentials rejected
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("CSV file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("CSV file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// Any other file system failure while reading or writing
    #[error("file error: {0}")]
    File(String),

    /// Structurally malformed row in a flat file
    #[error("CSV parse error: {0}")]
    Parse(String),

    /// Query rejected or failed inside ClickHouse
    #[error("query failed: {0}")]
    Query(String),

    /// Batch insert rejected by ClickHouse
    #[error("ClickHouse insert error: {0}")]
    Insert(String),

    /// Value that cannot be represented in its target column (strict policy only)
    #[error("cannot convert value '{value}' in column '{column}' to {column_type}")]
    Coercion {
        column: String,
        value: String,
        column_type: String,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl BridgeError {
    /// True when the caller supplied an unusable request (maps to a 400)
    pub fn is_caller_error(&self) -> bool {
        matches!(self, BridgeError::Validation(_))
    }

    /// Short stable name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "validation",
            BridgeError::Connection(_) => "connection",
            BridgeError::FileNotFound(_) | BridgeError::EmptyFile(_) | BridgeError::File(_) => {
                "file"
            }
            BridgeError::Parse(_) => "parse",
            BridgeError::Query(_) => "query",
            BridgeError::Insert(_) => "insert",
            BridgeError::Coercion { .. } => "coercion",
            BridgeError::Cancelled => "cancelled",
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::File(e.to_string())
    }
}

impl From<csv::Error> for BridgeError {
    fn from(e: csv::Error) -> Self {
        match e.kind() {
            csv::ErrorKind::Io(_) => BridgeError::File(e.to_string()),
            _ => BridgeError::Parse(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() || e.is_builder() {
            BridgeError::Connection(e.to_string())
        } else {
            BridgeError::Query(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(e: tokio::task::JoinError) -> Self {
        BridgeError::File(format!("blocking I/O task failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
