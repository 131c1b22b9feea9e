//! MySQL Database Gateway
//!
//! This module implements [`DatabaseGateway`] for MySQL databases (including MariaDB).
//!
//! # Features
//! - Client-server connections via TCP
//! - Schema introspection via `information_schema`
//! - Declared foreign keys via `information_schema.key_column_usage`
//! - Safety-gated statement execution
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - ENUM and SET types converted to strings
//! - BLOB data is Base64-encoded for JSON safety
//! - Timeouts enforced via `tokio::time::timeout`
//! - Row limits enforced in application code

use async_trait::async_trait;
use mysql_async::{prelude::*, Conn, OptsBuilder, Row, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::engine::{
    ColumnInfo, ConnectionConfig, DatabaseGateway, DatabaseType, ExecutionLimits, ForeignKeyInfo,
    KeyRole, QueryResult,
};
use crate::error::{QueryError, Result};
use crate::safety::assert_safe;

/// MySQL gateway
pub struct MySqlGateway {
    opts: OptsBuilder,
    database: String,
    limits: ExecutionLimits,
}

impl MySqlGateway {
    /// Create a gateway for a MySQL connection config
    ///
    /// No connection is opened here; every gateway call connects on its own.
    ///
    /// # Errors
    /// * `InvalidInput` if the config is not for MySQL or a required field is missing
    pub fn new(config: ConnectionConfig, limits: ExecutionLimits) -> Result<Self> {
        if config.engine != DatabaseType::MySQL {
            return Err(QueryError::invalid_input(format!(
                "Expected MySQL engine, got {}",
                config.engine
            )));
        }

        let opts = build_mysql_opts(&config)?;
        let database = config.database.unwrap_or_default();

        Ok(Self { opts, database, limits })
    }

    async fn connect(&self) -> Result<Conn> {
        Conn::new(self.opts.clone()).await.map_err(|e| {
            QueryError::connection_failed(format!("Failed to connect to MySQL: {e}"))
        })
    }
}

#[async_trait]
impl DatabaseGateway for MySqlGateway {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn database_name(&self) -> String {
        self.database.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;

        let query = "SELECT table_name
                     FROM information_schema.tables
                     WHERE table_schema = ?
                     AND table_type = 'BASE TABLE'
                     ORDER BY table_name";

        let rows: Vec<Row> = conn
            .exec(query, (self.database.as_str(),))
            .await
            .map_err(|e| QueryError::schema_unavailable(format!("Failed to query tables: {e}")))?;

        let tables = rows
            .into_iter()
            .map(|row| {
                row.get::<String, _>(0).ok_or_else(|| {
                    QueryError::schema_unavailable("Failed to extract table name")
                })
            })
            .collect::<Result<Vec<String>>>()?;

        disconnect(conn).await;
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut conn = self.connect().await?;

        let query = "SELECT column_name, column_type, is_nullable, column_key, column_default
                     FROM information_schema.columns
                     WHERE table_schema = ? AND table_name = ?
                     ORDER BY ordinal_position";

        let rows: Vec<Row> =
            conn.exec(query, (self.database.as_str(), table)).await.map_err(|e| {
                QueryError::schema_unavailable(format!("Failed to query columns for {table}: {e}"))
            })?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .get(0)
                .ok_or_else(|| QueryError::schema_unavailable("Failed to extract column name"))?;
            let data_type: String = row
                .get(1)
                .ok_or_else(|| QueryError::schema_unavailable("Failed to extract column type"))?;
            let is_nullable: String = row.get(2).unwrap_or_default();
            let column_key: String = row.get(3).unwrap_or_default();
            let default: Option<String> = row.get::<Option<String>, _>(4).flatten();

            columns.push(ColumnInfo {
                name,
                data_type,
                nullable: is_nullable == "YES",
                key_role: key_role_from_column_key(&column_key),
                default,
            });
        }

        disconnect(conn).await;

        if columns.is_empty() {
            return Err(QueryError::schema_unavailable(format!("Table '{table}' not found")));
        }
        Ok(columns)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let mut conn = self.connect().await?;

        let count: Option<u64> = conn
            .query_first(format!("SELECT COUNT(*) FROM {}", quote_identifier(table)))
            .await
            .map_err(|e| QueryError::execution_error(format!("Failed to count rows: {e}")))?;

        disconnect(conn).await;
        Ok(count.unwrap_or(0))
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let mut conn = self.connect().await?;
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
        let result = execute_query(&mut conn, &sql, Some(limit)).await?;
        disconnect(conn).await;
        Ok(result)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let mut conn = self.connect().await?;

        let query = "SELECT
                        kcu.constraint_name,
                        kcu.column_name,
                        kcu.referenced_table_name,
                        kcu.referenced_column_name
                     FROM information_schema.key_column_usage kcu
                     WHERE kcu.table_schema = ?
                     AND kcu.table_name = ?
                     AND kcu.referenced_table_name IS NOT NULL
                     ORDER BY kcu.constraint_name, kcu.ordinal_position";

        let rows: Vec<Row> =
            conn.exec(query, (self.database.as_str(), table)).await.map_err(|e| {
                QueryError::schema_unavailable(format!(
                    "Failed to query foreign keys for {table}: {e}"
                ))
            })?;

        let mut grouped: BTreeMap<String, ForeignKeyInfo> = BTreeMap::new();
        for row in rows {
            let (Some(constraint), Some(column), Some(referenced), Some(referenced_column)) = (
                row.get::<String, _>(0),
                row.get::<String, _>(1),
                row.get::<String, _>(2),
                row.get::<String, _>(3),
            ) else {
                return Err(QueryError::schema_unavailable("Failed to extract foreign key"));
            };

            let entry = grouped.entry(constraint).or_insert_with(|| ForeignKeyInfo {
                columns: Vec::new(),
                referenced_table: referenced,
                referenced_columns: Vec::new(),
            });
            entry.columns.push(column);
            entry.referenced_columns.push(referenced_column);
        }

        disconnect(conn).await;
        Ok(grouped.into_values().collect())
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        assert_safe(sql)?;

        let mut conn = self.connect().await?;

        let result = if let Some(timeout_ms) = self.limits.timeout_ms {
            tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                execute_query(&mut conn, sql, self.limits.max_rows),
            )
            .await
            .map_err(|_| {
                QueryError::execution_error(format!("Query exceeded timeout of {timeout_ms}ms"))
            })??
        } else {
            execute_query(&mut conn, sql, self.limits.max_rows).await?
        };

        disconnect(conn).await;
        Ok(result)
    }
}

/// Build MySQL connection options from `ConnectionConfig`
fn build_mysql_opts(config: &ConnectionConfig) -> Result<OptsBuilder> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| QueryError::invalid_input("MySQL requires 'host' parameter"))?;

    let port =
        config.port.ok_or_else(|| QueryError::invalid_input("MySQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| QueryError::invalid_input("MySQL requires 'user' parameter"))?;

    let password = config
        .password
        .as_ref()
        .ok_or_else(|| QueryError::invalid_input("MySQL requires 'password' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| QueryError::invalid_input("MySQL requires 'database' parameter"))?;

    Ok(OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(Some(database)))
}

/// Close a connection, logging rather than failing the call
async fn disconnect(conn: Conn) {
    if let Err(e) = conn.disconnect().await {
        tracing::debug!(error = %e, "mysql disconnect failed");
    }
}

/// Map `information_schema.columns.column_key` to a key role
fn key_role_from_column_key(column_key: &str) -> KeyRole {
    match column_key {
        "PRI" => KeyRole::Primary,
        "UNI" | "MUL" => KeyRole::Indexed,
        _ => KeyRole::None,
    }
}

/// Backtick-quote an identifier
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Execute a statement and collect its result set
async fn execute_query(conn: &mut Conn, sql: &str, max_rows: Option<usize>) -> Result<QueryResult> {
    let rows: Vec<Row> = conn
        .query(sql)
        .await
        .map_err(|e| QueryError::execution_error(format!("Failed to execute query: {e}")))?;

    // Column names come from the first row; an empty result set reports none
    let column_names: Vec<String> = rows
        .first()
        .map(|first| first.columns_ref().iter().map(|col| col.name_str().to_string()).collect())
        .unwrap_or_default();

    let take = max_rows.unwrap_or(usize::MAX);
    let rows_data = rows.iter().take(take).map(row_to_json).collect::<Result<Vec<_>>>()?;

    Ok(QueryResult { columns: column_names, rows: rows_data, rows_affected: None })
}

/// Convert a MySQL row to a JSON-safe `Vec`
fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len()).map(|idx| mysql_value_to_json(row, idx)).collect()
}

/// Convert MySQL value to JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row
        .as_ref(idx)
        .ok_or_else(|| QueryError::execution_error(format!("Failed to get value at index {idx}")))?;

    Ok(mysql_value(value))
}

fn mysql_value(value: &Value) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        },

        Value::Int(i) => serde_json::Value::Number((*i).into()),

        Value::UInt(u) => serde_json::json!(*u),

        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Double(d) => {
            serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(
            format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"),
        ),

        Value::Time(is_negative, days, hours, minutes, seconds, microseconds) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{microseconds:06}"
            ))
        }
    }
}
