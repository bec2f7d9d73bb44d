//! In-memory warehouse for tests
//!
//! Understands just enough SQL to serve `SELECT <cols> FROM <table> [LIMIT n]`
//! and records everything it is asked to do.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::db::client::ConnectionConfig;
use crate::db::schema::ColumnSchema;
use crate::db::warehouse::{Connector, RowStream, Warehouse};
use crate::error::{BridgeError, Result};
use crate::formats::Record;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: ColumnSchema,
    rows: Vec<Record>,
}

#[derive(Default)]
pub struct InMemoryWarehouse {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    queries: Mutex<Vec<String>>,
    rows_streamed: Arc<AtomicUsize>,
    insert_calls: AtomicUsize,
    /// 1-based insert call that fails
    fail_insert_on: Option<usize>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, schema: ColumnSchema, rows: Vec<Record>) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(name.to_string(), MemoryTable { schema, rows });
        self
    }

    pub fn fail_insert_on(mut self, call: usize) -> Self {
        self.fail_insert_on = Some(call);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Rows handed out by query streams so far
    pub fn rows_streamed(&self) -> usize {
        self.rows_streamed.load(Ordering::SeqCst)
    }

    fn table(&self, name: &str) -> Result<MemoryTable> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                BridgeError::Query(format!(
                    "Code: 60. DB::Exception: Table default.{} does not exist",
                    name
                ))
            })
    }
}

/// Split `SELECT a, b FROM t LIMIT n` into its parts
fn parse_select(sql: &str) -> Result<(Vec<String>, String, Option<usize>)> {
    let unsupported = || BridgeError::Query(format!("Syntax error: unsupported query '{}'", sql));

    let rest = sql.strip_prefix("SELECT ").ok_or_else(unsupported)?;
    let (columns, rest) = rest.split_once(" FROM ").ok_or_else(unsupported)?;
    let (table, limit) = match rest.split_once(" LIMIT ") {
        Some((table, limit)) => (table, Some(limit.trim().parse().map_err(|_| unsupported())?)),
        None => (rest, None),
    };
    if table.contains(" JOIN ") {
        return Err(unsupported());
    }

    let columns = columns.split(", ").map(|c| c.trim().to_string()).collect();
    Ok((columns, table.trim().to_string(), limit))
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.queries.lock().unwrap().push("SHOW TABLES".to_string());
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn describe_table(&self, table: &str) -> Result<ColumnSchema> {
        self.queries
            .lock()
            .unwrap()
            .push(format!("DESCRIBE TABLE {}", table));
        Ok(self.table(table)?.schema)
    }

    async fn query_stream(&self, sql: &str) -> Result<RowStream> {
        self.queries.lock().unwrap().push(sql.to_string());
        let (columns, table, limit) = parse_select(sql)?;
        let table = self.table(&table)?;

        for column in &columns {
            let bare = column.rsplit('.').next().unwrap_or(column);
            if table.schema.get(bare).is_none() {
                return Err(BridgeError::Query(format!(
                    "Code: 47. DB::Exception: Unknown identifier {}",
                    column
                )));
            }
        }

        let rows = table.rows.into_iter().take(limit.unwrap_or(usize::MAX));
        let counter = Arc::clone(&self.rows_streamed);
        let stream = futures::stream::iter(rows).map(move |row| {
            counter.fetch_add(1, Ordering::SeqCst);
            let projected: Record = columns
                .iter()
                .map(|column| {
                    let bare = column.rsplit('.').next().unwrap_or(column);
                    (bare.to_string(), row.get(bare).cloned().unwrap_or(Value::Null))
                })
                .collect();
            Ok(projected)
        });
        Ok(stream.boxed())
    }

    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Record]) -> Result<u64> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.queries.lock().unwrap().push(format!(
            "INSERT INTO {} ({}) FORMAT JSONEachRow",
            table,
            columns.join(", ")
        ));

        if self.fail_insert_on == Some(call) {
            return Err(BridgeError::Insert(
                "Code: 27. DB::Exception: Cannot parse input".to_string(),
            ));
        }

        let mut tables = self.tables.lock().unwrap();
        let target = tables.get_mut(table).ok_or_else(|| {
            BridgeError::Insert(format!("Table default.{} does not exist", table))
        })?;
        target.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }
}

/// Hands out one shared in-memory warehouse and counts connection attempts
pub struct MemoryConnector {
    pub warehouse: Arc<InMemoryWarehouse>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(warehouse: InMemoryWarehouse) -> Self {
        Self {
            warehouse: Arc::new(warehouse),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Warehouse>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        config.validate()?;
        Ok(Arc::clone(&self.warehouse) as Arc<dyn Warehouse>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select() {
        let (columns, table, limit) = parse_select("SELECT id, name FROM users LIMIT 100").unwrap();
        assert_eq!(columns, vec!["id", "name"]);
        assert_eq!(table, "users");
        assert_eq!(limit, Some(100));

        assert!(parse_select("SELECT a.id FROM a JOIN b ON a.id = b.id").is_err());
    }
}
