use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::db::client::{ClickHouseClient, ConnectionConfig};
use crate::db::schema::ColumnSchema;
use crate::error::Result;
use crate::formats::Record;

/// Lazy row stream returned by a query
pub type RowStream = BoxStream<'static, Result<Record>>;

/// The operations the bridge needs from the database side
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// `SHOW TABLES` in the configured database
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// `DESCRIBE TABLE <table>`
    async fn describe_table(&self, table: &str) -> Result<ColumnSchema>;

    /// Execute a SELECT and stream rows as they arrive
    async fn query_stream(&self, sql: &str) -> Result<RowStream>;

    /// Insert one batch as a single request, returning the rows accepted
    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Record]) -> Result<u64>;
}

/// Opens a warehouse handle for one run
pub trait Connector: Send + Sync {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Warehouse>>;
}

/// Connects to ClickHouse over HTTP, one client per call
#[derive(Debug, Default, Clone, Copy)]
pub struct ClickHouseConnector;

impl Connector for ClickHouseConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Warehouse>> {
        Ok(Arc::new(ClickHouseClient::new(config)?))
    }
}
