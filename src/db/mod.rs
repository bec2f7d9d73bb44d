//! Database layer - ClickHouse HTTP client, query construction and table schemas

pub mod client;
#[cfg(test)]
pub mod memory;
pub mod query;
pub mod schema;
pub mod warehouse;

pub use client::{ClickHouseClient, ConnectionConfig};
pub use schema::{Column, ColumnSchema, ColumnType};
pub use warehouse::{ClickHouseConnector, Connector, RowStream, Warehouse};
