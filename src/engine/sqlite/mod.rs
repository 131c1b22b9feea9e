//! `SQLite` Database Gateway
//!
//! This module implements [`DatabaseGateway`] for `SQLite` databases.
//!
//! # Features
//! - File-based connections (`/path/to/db.sqlite`)
//! - Schema introspection via `sqlite_master` and PRAGMAs
//! - Declared foreign keys via `PRAGMA foreign_key_list`
//! - Safety-gated statement execution
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - Every connection is opened read-only
//! - BLOB data is Base64-encoded for JSON safety
//! - Timeouts enforced via `busy_timeout`
//! - Row limits enforced in application code

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, Row};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{
    ColumnInfo, ConnectionConfig, DatabaseGateway, DatabaseType, ExecutionLimits, ForeignKeyInfo,
    KeyRole, QueryResult,
};
use crate::error::{QueryError, Result};
use crate::safety::assert_safe;

/// `SQLite` gateway
pub struct SqliteGateway {
    path: PathBuf,
    limits: ExecutionLimits,
}

impl SqliteGateway {
    /// Create a gateway for a `SQLite` connection config
    ///
    /// # Errors
    /// * `InvalidInput` if the config is not for `SQLite` or has no `file`
    pub fn new(config: ConnectionConfig, limits: ExecutionLimits) -> Result<Self> {
        if config.engine != DatabaseType::SQLite {
            return Err(QueryError::invalid_input(format!(
                "Expected SQLite engine, got {}",
                config.engine
            )));
        }

        let path = config
            .file
            .ok_or_else(|| QueryError::invalid_input("SQLite requires 'file' parameter"))?;

        Ok(Self { path, limits })
    }

    fn open(&self) -> Result<Connection> {
        let path_str = self.path.to_str().ok_or_else(|| {
            QueryError::invalid_input("SQLite file path contains invalid UTF-8 characters")
        })?;

        let conn = Connection::open_with_flags(path_str, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                QueryError::connection_failed(format!("Failed to open SQLite database: {e}"))
            })?;

        if let Some(timeout_ms) = self.limits.timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout_ms)).map_err(|e| {
                QueryError::connection_failed(format!("Failed to set timeout: {e}"))
            })?;
        }

        Ok(conn)
    }
}

#[async_trait]
impl DatabaseGateway for SqliteGateway {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn database_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| QueryError::schema_unavailable(format!("Failed to query tables: {e}")))?;

        let table_names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                QueryError::schema_unavailable(format!("Failed to fetch table names: {e}"))
            })?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| {
                QueryError::schema_unavailable(format!("Failed to collect table names: {e}"))
            })?;

        Ok(table_names)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.open()?;
        let quoted = quote_identifier(table);

        let indexed = indexed_columns(&conn, table)?;

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({quoted})")).map_err(|e| {
            QueryError::schema_unavailable(format!("Failed to prepare table_info for {table}: {e}"))
        })?;

        let columns: Vec<ColumnInfo> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let pk: i32 = row.get(5)?; // >0 means part of primary key
                let key_role = if pk > 0 {
                    KeyRole::Primary
                } else if indexed.contains(&name) {
                    KeyRole::Indexed
                } else {
                    KeyRole::None
                };
                Ok(ColumnInfo {
                    data_type: row.get::<_, String>(2)?,
                    nullable: row.get::<_, i32>(3)? == 0 && pk == 0,
                    default: row.get::<_, Option<String>>(4)?,
                    key_role,
                    name,
                })
            })
            .map_err(|e| {
                QueryError::schema_unavailable(format!("Failed to query columns for {table}: {e}"))
            })?
            .collect::<std::result::Result<Vec<ColumnInfo>, _>>()
            .map_err(|e| {
                QueryError::schema_unavailable(format!(
                    "Failed to collect columns for {table}: {e}"
                ))
            })?;

        if columns.is_empty() {
            return Err(QueryError::schema_unavailable(format!("Table '{table}' not found")));
        }

        Ok(columns)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote_identifier(table)), [], |row| {
                row.get(0)
            })
            .map_err(|e| QueryError::execution_error(format!("Failed to count rows: {e}")))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let conn = self.open()?;
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
        execute_query(&conn, &sql, Some(limit))
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(&format!("PRAGMA foreign_key_list({})", quote_identifier(table)))
            .map_err(|e| {
                QueryError::schema_unavailable(format!(
                    "Failed to prepare foreign_key_list for {table}: {e}"
                ))
            })?;

        // Grouped by constraint id; BTreeMap keeps constraint order stable
        let mut grouped: BTreeMap<i32, ForeignKeyInfo> = BTreeMap::new();

        let rows = stmt
            .query_map([], |row| {
                let id: i32 = row.get(0)?;
                let referenced: String = row.get(2)?;
                let from_col: String = row.get(3)?;
                let to_col: Option<String> = row.get(4)?;
                Ok((id, referenced, from_col, to_col))
            })
            .map_err(|e| {
                QueryError::schema_unavailable(format!(
                    "Failed to query foreign keys for {table}: {e}"
                ))
            })?;

        for row in rows {
            let (id, referenced, from_col, to_col) = row.map_err(|e| {
                QueryError::schema_unavailable(format!("Failed to read foreign key: {e}"))
            })?;
            let entry = grouped.entry(id).or_insert_with(|| ForeignKeyInfo {
                columns: Vec::new(),
                referenced_table: referenced,
                referenced_columns: Vec::new(),
            });
            entry.columns.push(from_col);
            // A NULL target column means the referenced table's primary key
            entry.referenced_columns.push(to_col.unwrap_or_else(|| "id".to_string()));
        }

        Ok(grouped.into_values().collect())
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        assert_safe(sql)?;

        let conn = self.open()?;
        execute_query(&conn, sql, self.limits.max_rows)
    }
}

/// Quote an identifier for interpolation into PRAGMA and SELECT statements
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Columns covered by a non-automatic index
fn indexed_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut idx_stmt =
        conn.prepare(&format!("PRAGMA index_list({})", quote_identifier(table))).map_err(|e| {
            QueryError::schema_unavailable(format!("Failed to prepare index_list for {table}: {e}"))
        })?;

    let index_names: Vec<String> = idx_stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| {
            QueryError::schema_unavailable(format!("Failed to query indexes for {table}: {e}"))
        })?
        .filter_map(std::result::Result::ok)
        .collect();

    let mut columns = HashSet::new();
    for index_name in index_names {
        let mut info_stmt = conn
            .prepare(&format!("PRAGMA index_info({})", quote_identifier(&index_name)))
            .map_err(|e| {
                QueryError::schema_unavailable(format!(
                    "Failed to prepare index_info for {index_name}: {e}"
                ))
            })?;

        let names = info_stmt
            .query_map([], |row| row.get::<_, Option<String>>(2))
            .map_err(|e| {
                QueryError::schema_unavailable(format!(
                    "Failed to query index columns for {index_name}: {e}"
                ))
            })?
            .filter_map(std::result::Result::ok)
            .flatten();

        columns.extend(names);
    }

    Ok(columns)
}

/// Execute a statement and collect its result set
fn execute_query(conn: &Connection, sql: &str, max_rows: Option<usize>) -> Result<QueryResult> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| QueryError::execution_error(format!("Failed to prepare query: {e}")))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    let mut rows_data = Vec::new();
    let mut rows = stmt
        .query([])
        .map_err(|e| QueryError::execution_error(format!("Failed to execute query: {e}")))?;

    while let Some(row) = rows
        .next()
        .map_err(|e| QueryError::execution_error(format!("Failed to fetch row: {e}")))?
    {
        if max_rows.is_some_and(|max| rows_data.len() >= max) {
            break;
        }
        let values = row_to_json(column_names.len(), row)
            .map_err(|e| QueryError::execution_error(format!("Failed to read row: {e}")))?;
        rows_data.push(values);
    }

    Ok(QueryResult { columns: column_names, rows: rows_data, rows_affected: None })
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(
    column_count: usize,
    row: &Row,
) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..column_count).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
