use serde::Serialize;
use std::fmt;

use crate::db::ConnectionConfig;
use crate::db::query::build_select;
use crate::error::{BridgeError, Result};
use crate::formats::DelimitedConfig;

/// Which way records move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// ClickHouse tables to a CSV file
    DatabaseToFile,
    /// Delimited file to a ClickHouse table
    FileToDatabase,
}

impl Direction {
    /// Map the `sourceType` request field
    pub fn from_source_type(source_type: &str) -> Result<Self> {
        match source_type {
            "clickhouse" => Ok(Direction::DatabaseToFile),
            "flatFile" => Ok(Direction::FileToDatabase),
            _ => Err(BridgeError::Validation("Invalid sourceType".to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::DatabaseToFile => write!(f, "clickhouse -> file"),
            Direction::FileToDatabase => write!(f, "file -> clickhouse"),
        }
    }
}

/// A flat file named by the caller, relative to the base directory
#[derive(Debug, Clone, Default)]
pub struct FileDescriptor {
    pub path: String,
    pub delimiter: DelimitedConfig,
}

/// What a run is asked to do
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub direction: Direction,
    pub connection: ConnectionConfig,
    /// Source tables, or the single destination table for file imports
    pub tables: Vec<String>,
    pub join_condition: Option<String>,
    pub columns: Vec<String>,
    /// Source file for file imports and file previews
    pub file: Option<FileDescriptor>,
}

/// Operation a request is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preview,
    Ingestion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Preview => write!(f, "preview"),
            Stage::Ingestion => write!(f, "ingestion"),
        }
    }
}

impl TransferSpec {
    /// Reject unusable requests before any I/O happens
    pub fn validate_for(&self, stage: Stage) -> Result<()> {
        match self.direction {
            Direction::DatabaseToFile => {
                if self.tables.is_empty() {
                    return Err(BridgeError::Validation(format!(
                        "No table selected for {}.",
                        stage
                    )));
                }
                if self.columns.is_empty() {
                    return Err(BridgeError::Validation(format!(
                        "No columns selected for {}.",
                        stage
                    )));
                }
                if self.tables.len() > 1 && self.join_condition().is_none() {
                    return Err(BridgeError::Validation(
                        "A join condition is required when selecting multiple tables.".to_string(),
                    ));
                }
                self.connection.validate()?;
            }
            Direction::FileToDatabase => {
                if self.file_path().is_none() {
                    return Err(BridgeError::Validation("File name must be provided.".to_string()));
                }
                if stage == Stage::Ingestion {
                    if self.target_table().is_none() {
                        return Err(BridgeError::Validation(
                            "Target ClickHouse table must be specified.".to_string(),
                        ));
                    }
                    if self.columns.is_empty() {
                        return Err(BridgeError::Validation(
                            "No columns selected for ingestion.".to_string(),
                        ));
                    }
                    self.connection.validate()?;
                }
            }
        }

        Ok(())
    }

    pub fn join_condition(&self) -> Option<&str> {
        self.join_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Destination table of a file import
    pub fn target_table(&self) -> Option<&str> {
        self.tables
            .first()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file
            .as_ref()
            .map(|f| f.path.trim())
            .filter(|p| !p.is_empty())
    }

    pub fn delimiter(&self) -> DelimitedConfig {
        self.file
            .as_ref()
            .map(|f| f.delimiter.clone())
            .unwrap_or_default()
    }

    /// SELECT for a database source
    pub fn select_query(&self, limit: Option<usize>) -> String {
        build_select(&self.tables, &self.columns, self.join_condition(), limit)
    }
}
