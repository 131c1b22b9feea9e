//! Database Access Gateway
//!
//! This module defines the collaborator through which the query intelligence engine
//! reaches a database. Each engine (`MySQL`, `SQLite`) implements [`DatabaseGateway`].
//!
//! # Stateless Design
//! Gateways hold only a `ConnectionConfig` and execution limits.
//! Connections are opened, used, and closed within each method call.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! No shared SQL helpers or cross-engine abstractions.
//!
//! # Read-only Contract
//! Only `SELECT`, `SHOW`, `DESCRIBE` and `EXPLAIN` statements are expected to reach
//! [`DatabaseGateway::execute`]. Every engine re-checks the safety gate before running
//! a statement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{QueryError, Result};

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(test)]
pub(crate) mod stub;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `MySQL` database (includes `MariaDB` and `TiDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection configuration for database engines
///
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database engine type
    pub engine: DatabaseType,

    /// Hostname (for mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port number (for mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (for mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (for mysql)
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (for mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Database file path (for sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Create a new `MySQL` connection config
    #[must_use]
    pub const fn mysql(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::MySQL,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
        }
    }

    /// Create a new `SQLite` connection config
    #[must_use]
    pub const fn sqlite(file: PathBuf) -> Self {
        Self {
            engine: DatabaseType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            file: Some(file),
        }
    }

    /// Human-readable database name used in schema context headers
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.engine {
            DatabaseType::MySQL => self.database.clone().unwrap_or_else(|| "unknown".to_string()),
            DatabaseType::SQLite => self
                .file
                .as_ref()
                .and_then(|f| f.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Limits applied by a gateway when executing statements
///
/// Both limits default to `None` (unbounded).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum number of rows to return (enforced by the engine)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,

    /// Query timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Role a column plays in the table's keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Part of the primary key
    Primary,
    /// Covered by a (non-primary) index
    Indexed,
    /// No key participation
    None,
}

impl KeyRole {
    /// Short tag used in rendered schema context (`PRI`, `MUL`, empty)
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Primary => "PRI",
            Self::Indexed => "MUL",
            Self::None => "",
        }
    }
}

/// Column information as reported by `describe_table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Declared column type (engine-specific)
    pub data_type: String,

    /// Whether column allows NULL values
    pub nullable: bool,

    /// Key participation
    pub key_role: KeyRole,

    /// Default value (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Convenience constructor used by gateways and tests
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, key_role: KeyRole) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: key_role != KeyRole::Primary,
            key_role,
            default: None,
        }
    }
}

/// Declared foreign key, when the engine exposes one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Column names in this table
    pub columns: Vec<String>,

    /// Referenced table name
    pub referenced_table: String,

    /// Referenced column names
    pub referenced_columns: Vec<String>,
}

/// Query execution result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Result rows, each aligned with `columns`
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows affected (statements without a result set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl QueryResult {
    /// Whether the statement produced a result set
    #[must_use]
    pub fn is_rowset(&self) -> bool {
        self.rows_affected.is_none()
    }
}

/// Database access gateway
///
/// The query intelligence engine only talks to databases through this trait.
#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    /// Engine behind this gateway
    fn database_type(&self) -> DatabaseType;

    /// Name of the connected database, for schema context headers
    fn database_name(&self) -> String;

    /// List base table names, sorted
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describe the columns of a table in ordinal order
    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Count rows in a table
    async fn row_count(&self, table: &str) -> Result<u64>;

    /// Fetch up to `limit` rows from a table
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult>;

    /// Declared foreign keys for a table
    ///
    /// Engines without catalog support return an empty list; relationships are then
    /// inferred from naming conventions only.
    async fn foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKeyInfo>> {
        Ok(Vec::new())
    }

    /// Execute a read-only statement
    async fn execute(&self, sql: &str) -> Result<QueryResult>;
}

/// Open a gateway for the configured engine
///
/// Only engines compiled in through cargo features are available.
pub fn connect(config: &ConnectionConfig, limits: ExecutionLimits) -> Result<Arc<dyn DatabaseGateway>> {
    match config.engine {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => Ok(Arc::new(sqlite::SqliteGateway::new(config.clone(), limits)?)),
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => Ok(Arc::new(mysql::MySqlGateway::new(config.clone(), limits)?)),
        #[allow(unreachable_patterns)]
        other => Err(QueryError::invalid_input(format!(
            "Engine '{other}' is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_serialization() {
        assert_eq!(serde_json::to_string(&DatabaseType::MySQL).unwrap(), r#""mysql""#);
        assert_eq!(serde_json::to_string(&DatabaseType::SQLite).unwrap(), r#""sqlite""#);
    }

    #[test]
    fn test_connection_config_constructors() {
        let mysql_config = ConnectionConfig::mysql(
            "localhost".to_string(),
            3306,
            "user".to_string(),
            "pass".to_string(),
            "shop".to_string(),
        );
        assert_eq!(mysql_config.engine, DatabaseType::MySQL);
        assert_eq!(mysql_config.port, Some(3306));
        assert_eq!(mysql_config.display_name(), "shop");

        let sqlite_config = ConnectionConfig::sqlite(PathBuf::from("/tmp/clinic.db"));
        assert_eq!(sqlite_config.engine, DatabaseType::SQLite);
        assert_eq!(sqlite_config.display_name(), "clinic.db");
    }

    #[test]
    fn test_password_not_serialized_when_absent() {
        let config = ConnectionConfig::sqlite(PathBuf::from("/tmp/x.db"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_key_role_tags() {
        assert_eq!(KeyRole::Primary.tag(), "PRI");
        assert_eq!(KeyRole::Indexed.tag(), "MUL");
        assert_eq!(KeyRole::None.tag(), "");
        assert_eq!(serde_json::to_string(&KeyRole::Indexed).unwrap(), r#""indexed""#);
    }

    #[test]
    fn test_query_result_rowset() {
        let rowset = QueryResult { columns: vec!["id".into()], rows: vec![], rows_affected: None };
        assert!(rowset.is_rowset());

        let affected = QueryResult { rows_affected: Some(3), ..QueryResult::default() };
        assert!(!affected.is_rowset());
    }
}
