//! Schema Model
//!
//! Immutable table metadata as seen by the query intelligence engine, the schema hash
//! used for drift detection, and the text rendering handed to the drafting oracle.
//!
//! A [`TableSchema`] is built once per schema fetch and replaced wholesale on refresh.
//! There is no mutating API after construction.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::engine::{ColumnInfo, ForeignKeyInfo, KeyRole, QueryResult};

pub mod cache;
pub mod context;

pub use cache::{
    CacheEntry, CacheSettings, CacheStats, CachedSchema, Clock, ManualClock, SchemaCache,
    SchemaSnapshot, SystemClock,
};
pub use context::{display_value, join_clause, render_schema_context};

/// Column-name suffixes that mark a foreign-key-like column
pub const FK_SUFFIXES: &[&str] = &["_id", "_fk"];

/// Strip a foreign-key suffix from a column name
///
/// Returns the lowercase base name (`user_id` → `user`), or `None` when the column
/// has no recognised suffix or nothing remains after stripping.
#[must_use]
pub fn strip_fk_suffix(column: &str) -> Option<String> {
    let lower = column.to_lowercase();
    FK_SUFFIXES.iter().find_map(|suffix| {
        lower
            .strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| base.trim_end_matches('_').to_string())
    })
}

/// Table metadata snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    declared_foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_rows: Option<QueryResult>,
    #[serde(default)]
    row_count: Option<u64>,
}

impl TableSchema {
    /// Create a table from its described columns
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
            declared_foreign_keys: Vec::new(),
            sample_rows: None,
            row_count: None,
        }
    }

    /// Attach a row count
    #[must_use]
    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    /// Attach sample rows
    #[must_use]
    pub fn with_sample_rows(mut self, sample: QueryResult) -> Self {
        self.sample_rows = Some(sample);
        self
    }

    /// Attach foreign keys declared in the database catalog
    #[must_use]
    pub fn with_declared_foreign_keys(mut self, foreign_keys: Vec<ForeignKeyInfo>) -> Self {
        self.declared_foreign_keys = foreign_keys;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn declared_foreign_keys(&self) -> &[ForeignKeyInfo] {
        &self.declared_foreign_keys
    }

    pub fn sample_rows(&self) -> Option<&QueryResult> {
        self.sample_rows.as_ref()
    }

    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// Column names in ordinal order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Primary key column names
    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key_role == KeyRole::Primary)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Foreign-key-like column names (suffix convention, primary key excluded)
    pub fn foreign_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key_role != KeyRole::Primary && strip_fk_suffix(&c.name).is_some())
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Digest over sorted `(table, column, type)` tuples
///
/// Identical schemas hash identically regardless of the order tables or columns were
/// reported in. Any added, removed, renamed or retyped column changes the hash.
#[must_use]
pub fn schema_hash<'a, I>(tuples: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
{
    let mut sorted: Vec<(&str, &str, &str)> = tuples.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (table, column, data_type) in sorted {
        hasher.update(table.as_bytes());
        hasher.update([0x1f]);
        hasher.update(column.as_bytes());
        hasher.update([0x1f]);
        hasher.update(data_type.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

/// Schema hash over described tables
#[must_use]
pub fn hash_tables(tables: &[(String, Vec<ColumnInfo>)]) -> String {
    schema_hash(tables.iter().flat_map(|(table, columns)| {
        columns.iter().map(move |c| (table.as_str(), c.name.as_str(), c.data_type.as_str()))
    }))
}

/// Digest over a sorted, deduplicated set of table names
#[must_use]
pub fn table_set_key<S: AsRef<str>>(tables: &[S]) -> String {
    let mut names: Vec<String> = tables.iter().map(|t| t.as_ref().to_lowercase()).collect();
    names.sort_unstable();
    names.dedup();

    let mut hasher = Sha256::new();
    for name in &names {
        hasher.update(name.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> TableSchema {
        TableSchema::new(
            "sales",
            vec![
                ColumnInfo::new("id", "INTEGER", KeyRole::Primary),
                ColumnInfo::new("user_id", "INTEGER", KeyRole::Indexed),
                ColumnInfo::new("amount", "REAL", KeyRole::None),
            ],
        )
    }

    #[test]
    fn test_strip_fk_suffix() {
        assert_eq!(strip_fk_suffix("user_id"), Some("user".to_string()));
        assert_eq!(strip_fk_suffix("Customer_ID"), Some("customer".to_string()));
        assert_eq!(strip_fk_suffix("owner_fk"), Some("owner".to_string()));
        assert_eq!(strip_fk_suffix("id"), None);
        assert_eq!(strip_fk_suffix("_id"), None);
        assert_eq!(strip_fk_suffix("name"), None);
    }

    #[test]
    fn test_derived_keys() {
        let table = sales();
        assert_eq!(table.primary_keys(), vec!["id"]);
        assert_eq!(table.foreign_keys(), vec!["user_id"]);
    }

    #[test]
    fn test_primary_key_is_not_foreign_key() {
        let table = TableSchema::new(
            "profiles",
            vec![
                ColumnInfo::new("user_id", "INTEGER", KeyRole::Primary),
                ColumnInfo::new("bio", "TEXT", KeyRole::None),
            ],
        );
        assert!(table.foreign_keys().is_empty());
    }

    #[test]
    fn test_schema_hash_order_independent() {
        let a = schema_hash([("users", "id", "INT"), ("sales", "amount", "REAL")]);
        let b = schema_hash([("sales", "amount", "REAL"), ("users", "id", "INT")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_schema_hash_detects_type_change() {
        let a = schema_hash([("users", "id", "INT")]);
        let b = schema_hash([("users", "id", "BIGINT")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_table_set_key_is_order_and_case_insensitive() {
        assert_eq!(table_set_key(&["users", "sales"]), table_set_key(&["Sales", "users", "users"]));
        assert_ne!(table_set_key(&["users"]), table_set_key(&["users", "sales"]));
    }
}
