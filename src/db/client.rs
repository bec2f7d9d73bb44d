//! ClickHouse HTTP interface client
//!
//! Every statement is sent as a POST to the server root with
//! `default_format=JSONEachRow`, so result rows come back as one JSON object
//! per line and can be parsed as the response body streams in.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::{CONNECT_TIMEOUT, QUERY_TIMEOUT};
use crate::db::query::quote_identifier;
use crate::db::schema::{ColumnSchema, name_of};
use crate::db::warehouse::{RowStream, Warehouse};
use crate::error::{BridgeError, Result};
use crate::formats::Record;

/// Connection parameters supplied by the caller for one run
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default)]
    pub host: String,
    /// Accepted as a JSON string or number
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Takes precedence over `password` when both are set
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default, alias = "useTLS")]
    pub use_tls: bool,
    /// Bound on metadata queries and inserts
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .field("use_tls", &self.use_tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Text(String),
    Number(u64),
}

fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<PortValue>::deserialize(deserializer)? {
        Some(PortValue::Text(text)) => text,
        Some(PortValue::Number(number)) => number.to_string(),
        None => String::new(),
    })
}

impl ConnectionConfig {
    /// Check required parameters without touching the network, returning the port
    pub fn validate(&self) -> Result<u16> {
        let missing = [&self.host, &self.port, &self.database, &self.user]
            .iter()
            .any(|field| field.trim().is_empty());
        if missing {
            return Err(BridgeError::Validation(
                "Missing ClickHouse connection parameters.".to_string(),
            ));
        }

        self.port.trim().parse::<u16>().map_err(|_| {
            BridgeError::Validation(format!("Invalid ClickHouse port: '{}'", self.port))
        })
    }

    /// `http[s]://host:port/`
    pub fn base_url(&self) -> Result<Url> {
        let port = self.validate()?;
        let scheme = if self.use_tls { "https" } else { "http" };
        Url::parse(&format!("{}://{}:{}/", scheme, self.host.trim(), port)).map_err(|e| {
            BridgeError::Validation(format!("Invalid ClickHouse host '{}': {}", self.host, e))
        })
    }

    /// Secret sent as the ClickHouse key
    fn secret(&self) -> &str {
        self.jwt
            .as_deref()
            .filter(|jwt| !jwt.is_empty())
            .or(self.password.as_deref())
            .unwrap_or_default()
    }
}

/// Client for a single run. Not shared between runs.
pub struct ClickHouseClient {
    http: reqwest::Client,
    base_url: Url,
    database: String,
    user: String,
    key: String,
    timeout: Duration,
}

impl ClickHouseClient {
    /// Validate the configuration and build the HTTP client. No I/O happens here.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            database: config.database.trim().to_string(),
            user: config.user.trim().to_string(),
            key: config.secret().to_string(),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(QUERY_TIMEOUT),
        })
    }

    fn post(&self) -> reqwest::RequestBuilder {
        self.http
            .post(self.base_url.clone())
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.key)
    }

    /// Read statement in the body, rows returned as JSONEachRow
    fn select(&self, sql: &str) -> reqwest::RequestBuilder {
        self.post()
            .query(&[
                ("database", self.database.as_str()),
                ("default_format", "JSONEachRow"),
            ])
            .body(sql.to_string())
    }

    /// Run a statement and collect every row. Only for small metadata results.
    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<Record>> {
        let response = self.select(sql).timeout(self.timeout).send().await?;
        let response = check_status(response, BridgeError::Query).await?;
        let body = response.bytes().await?;

        let mut rows = Vec::new();
        for line in body.split(|b| *b == b'\n') {
            if let Some(record) = parse_line(line)? {
                rows.push(record);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl Warehouse for ClickHouseClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self.fetch_all("SHOW TABLES").await?;
        Ok(rows
            .iter()
            .filter_map(|row| name_of(row, &["name", "table"]))
            .collect())
    }

    async fn describe_table(&self, table: &str) -> Result<ColumnSchema> {
        if table.trim().is_empty() {
            return Err(BridgeError::Validation("Table name must be provided.".into()));
        }

        let rows = self.fetch_all(&format!("DESCRIBE TABLE {}", table)).await?;
        let schema = ColumnSchema::from_describe_rows(&rows);
        if schema.is_empty() {
            return Err(BridgeError::Query(format!(
                "Table '{}' not found or has no columns",
                table
            )));
        }
        Ok(schema)
    }

    async fn query_stream(&self, sql: &str) -> Result<RowStream> {
        debug!(sql, "Executing streaming query");
        let response = self.select(sql).send().await?;
        let response = check_status(response, BridgeError::Query).await?;
        let mut body = response.bytes_stream().boxed();

        let rows: RowStream = try_stream! {
            let mut lines = LineBuffer::default();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| {
                    BridgeError::Connection(format!("response stream interrupted: {}", e))
                })?;

                for line in lines.push(&chunk) {
                    if let Some(record) = parse_line(&line)? {
                        yield record;
                    }
                }
            }

            if let Some(record) = parse_line(&lines.into_remainder())? {
                yield record;
            }
        }
        .boxed();
        Ok(rows)
    }

    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Record]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut body = Vec::with_capacity(rows.len() * 64);
        for row in rows {
            serde_json::to_writer(&mut body, row).map_err(|e| BridgeError::Insert(e.to_string()))?;
            body.push(b'\n');
        }

        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!("INSERT INTO {} ({}) FORMAT JSONEachRow", table, column_list);

        let response = self
            .post()
            .query(&[
                ("database", self.database.as_str()),
                ("query", statement.as_str()),
            ])
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;
        check_status(response, BridgeError::Insert).await?;

        Ok(rows.len() as u64)
    }
}

/// Map a non-success response onto the error taxonomy
///
/// Rejected credentials are connection errors regardless of the statement.
async fn check_status(response: Response, on_error: fn(String) -> BridgeError) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    warn!(status = status.as_u16(), "ClickHouse request failed");

    let auth_failed = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("AUTHENTICATION_FAILED")
        || body.contains("Authentication failed");
    if auth_failed {
        Err(BridgeError::Connection(message))
    } else {
        Err(on_error(message))
    }
}

/// Splits a chunked response body into lines
///
/// Bytes already searched for a newline are never searched again, so a row
/// spread over many chunks costs time linear in its length.
#[derive(Default)]
struct LineBuffer {
    buffer: Vec<u8>,
    scanned: usize,
}

impl LineBuffer {
    /// Append a chunk and return the lines it completes, without terminators
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            lines.push(self.buffer[start..end].to_vec());
            start = end + 1;
            from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Bytes after the last newline
    fn into_remainder(self) -> Vec<u8> {
        self.buffer
    }
}

/// Parse one JSONEachRow line. Blank lines yield `None`.
///
/// ClickHouse reports errors raised mid-stream as plain text after the rows
/// already sent, so a non-JSON line is a query failure.
///
/// String columns are not required to hold UTF-8. Invalid sequences are
/// replaced with U+FFFD and logged.
fn parse_line(line: &[u8]) -> Result<Option<Record>> {
    let text = String::from_utf8_lossy(line);
    if matches!(text, Cow::Owned(_)) {
        warn!(bytes = line.len(), "Row contains invalid UTF-8, replacing undecodable bytes");
    }
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => Ok(Some(record)),
        Ok(other) => Err(BridgeError::Query(format!(
            "unexpected row in response: {}",
            other
        ))),
        Err(_) => Err(BridgeError::Query(text.to_string())),
    }
}
