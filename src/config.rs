//! Configuration constants for the ingestion bridge
//!
//! This module centralizes the tunable parameters and fixed locations used
//! throughout the application.

use std::time::Duration;

// ============================================================================
// Connection Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for metadata queries and batch inserts
///
/// Streaming SELECTs are not bounded by this value since a full export can
/// legitimately run far longer; they rely on the connect timeout and on the
/// server closing the response.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(180); // 3 minutes

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Number of records moved as one unit between source and sink
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Largest batch buffer reserved up front. Bigger batches grow as rows arrive.
pub const MAX_BATCH_PREALLOCATION: usize = 10_000;

/// Hard cap on rows returned by a preview. Not configurable.
pub const PREVIEW_ROW_LIMIT: usize = 100;

pub const DEFAULT_DELIMITER: &str = ",";

// ============================================================================
// File Locations
// ============================================================================

/// Directory (relative to the base directory) receiving ClickHouse exports
pub const OUTPUT_DIR: &str = "output";

/// Export file name. Overwritten on every run.
pub const OUTPUT_FILE_NAME: &str = "clickhouse_to_flatfile.csv";

/// Directory (relative to the base directory) receiving uploaded files
pub const UPLOADS_DIR: &str = "uploads";

pub const MAX_UPLOAD_SIZE: usize = 512 * 1024 * 1024; // 512 MB

// ============================================================================
// Server Configuration
// ============================================================================

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
