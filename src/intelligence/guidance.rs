//! Failure guidance
//!
//! Best-effort help attached to failed answers: the tables a caller can ask about,
//! name suggestions when the database rejected an unknown column or table, and example
//! questions synthesised from column shapes. Building guidance cannot fail.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::QueryError;
use crate::output::ErrorInfo;
use crate::schema::{SchemaSnapshot, TableSchema};
use crate::validation::nearest_matches;

const MAX_SUGGESTIONS: usize = 5;
const MAX_EXAMPLES: usize = 10;

const NAME_HINTS: &[&str] = &["name", "title", "nama", "label"];
const DATE_HINTS: &[&str] = &["date", "time", "tgl", "created", "updated", "_at"];
const AMOUNT_HINTS: &[&str] =
    &["amount", "price", "total", "cost", "salary", "biaya", "harga", "jumlah", "qty", "quantity"];

static UNKNOWN_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:unknown column\s+'([^']+)'|no such column:\s*([\w.]+))")
        .expect("unknown column pattern")
});

static UNKNOWN_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:no such table:\s*([\w.]+)|table\s+'([^']+)'\s+doesn't exist)")
        .expect("unknown table pattern")
});

/// A table and its column names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGuidance {
    pub name: String,
    pub columns: Vec<String>,
}

/// Help for a caller whose question failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    pub available_tables: Vec<TableGuidance>,
    pub suggestions: Vec<String>,
    pub example_questions: Vec<String>,

    /// Set when the schema could not be consulted while building this guidance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ErrorInfo>,
}

impl Guidance {
    #[must_use]
    pub fn degraded_by(mut self, failure: &QueryError) -> Self {
        self.degraded = Some(ErrorInfo::from(failure));
        self
    }
}

/// Guidance for an error, using the schema when one is available
pub fn build_guidance(error: &QueryError, snapshot: Option<&SchemaSnapshot>) -> Guidance {
    let Some(snapshot) = snapshot else {
        return Guidance {
            suggestions: fallback_suggestions(error),
            ..Guidance::default()
        };
    };

    let tables = snapshot.tables();
    let message = error.message();
    let mut suggestions = Vec::new();

    if let Some(column) = capture(&UNKNOWN_COLUMN, &message) {
        let column = column.rsplit('.').next().unwrap_or(&column).to_string();
        let similar = similar_columns(&column, tables);
        if similar.is_empty() {
            suggestions.push(format!("Column '{column}' does not exist in any table"));
        } else {
            suggestions.push(format!("Column '{column}' not found. Did you mean: {}?", similar.join(", ")));
        }
    }

    if let Some(table) = capture(&UNKNOWN_TABLE, &message) {
        let table = table.rsplit('.').next().unwrap_or(&table).to_string();
        let names = snapshot.table_names();
        let nearest = nearest_matches(&table, &names, 3);
        if nearest.is_empty() {
            suggestions.push(format!("Table '{table}' does not exist"));
        } else {
            suggestions.push(format!("Table '{table}' not found. Did you mean: {}?", nearest.join(", ")));
        }
    }

    suggestions.extend(fallback_suggestions(error));

    Guidance {
        available_tables: tables
            .iter()
            .map(|t| TableGuidance {
                name: t.name().to_string(),
                columns: t.column_names().map(ToString::to_string).collect(),
            })
            .collect(),
        suggestions,
        example_questions: example_questions(tables),
        degraded: None,
    }
}

fn capture(pattern: &Regex, message: &str) -> Option<String> {
    let captures = pattern.captures(message)?;
    captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str().to_string())
}

fn fallback_suggestions(error: &QueryError) -> Vec<String> {
    let hint = match error {
        QueryError::SchemaUnavailable(_) | QueryError::ConnectionFailed(_) => {
            "Check the database connection settings and try again"
        }
        QueryError::DraftingFailed(_) => "Rephrase the question using table or column names",
        QueryError::SafetyRejected(_) => "Ask a read-only question; data cannot be modified",
        QueryError::ExecutionError(_) => "Try a simpler question or name the table explicitly",
        _ => return Vec::new(),
    };
    vec![hint.to_string()]
}

/// `table.column` names resembling `column`, best first
///
/// A column qualifies when either name contains the other or they share an
/// underscore-separated token.
fn similar_columns(column: &str, tables: &[TableSchema]) -> Vec<String> {
    let needle = column.to_lowercase();
    let needle_tokens: Vec<&str> = needle.split('_').filter(|t| !t.is_empty()).collect();

    let mut scored: Vec<(usize, String)> = Vec::new();
    for table in tables {
        for name in table.column_names() {
            let lower = name.to_lowercase();
            let score = if lower == needle {
                3
            } else if lower.contains(&needle) || needle.contains(&lower) {
                2
            } else if lower.split('_').any(|t| !t.is_empty() && needle_tokens.contains(&t)) {
                1
            } else {
                continue;
            };
            scored.push((score, format!("{}.{name}", table.name())));
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(MAX_SUGGESTIONS).map(|(_, name)| name).collect()
}

/// Example questions from column-name shapes
pub fn example_questions(tables: &[TableSchema]) -> Vec<String> {
    let mut examples = Vec::new();

    for table in tables {
        let name = table.name();
        let columns: Vec<&str> = table.column_names().collect();
        let has = |hints: &[&str]| {
            columns.iter().find(|c| {
                let lower = c.to_lowercase();
                hints.iter().any(|h| lower.contains(h))
            })
        };

        let before = examples.len();
        if has(NAME_HINTS).is_some() {
            examples.push(format!("Show me all {name}"));
        }
        if has(DATE_HINTS).is_some() {
            examples.push(format!("Show recent {name}"));
        }
        if let Some(amount) = has(AMOUNT_HINTS) {
            examples.push(format!("What is the total {amount} in {name}?"));
        }
        if examples.len() == before {
            examples.push(format!("How many {name} are there?"));
        }
    }

    examples.truncate(MAX_EXAMPLES);
    examples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ColumnInfo, KeyRole};
    use crate::graph::{GraphOptions, RelationshipGraph};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema::new(
            name,
            columns.iter().map(|c| ColumnInfo::new(*c, "TEXT", KeyRole::None)).collect(),
        )
    }

    fn snapshot() -> SchemaSnapshot {
        let graph = RelationshipGraph::build(
            vec![
                table("users", &["id", "full_name", "created_at"]),
                table("sales", &["id", "user_id", "sale_amount"]),
                table("tags", &["id"]),
            ],
            &GraphOptions::default(),
        );
        SchemaSnapshot::new("shop", "hash", graph, Utc::now())
    }

    #[test]
    fn test_example_questions_from_column_shapes() {
        let snapshot = snapshot();
        assert_eq!(
            example_questions(snapshot.tables()),
            vec![
                "Show me all users",
                "Show recent users",
                "What is the total sale_amount in sales?",
                "How many tags are there?",
            ]
        );
    }

    #[test]
    fn test_unknown_column_suggestions() {
        let snapshot = snapshot();
        let error = QueryError::execution_error("no such column: amount");
        let guidance = build_guidance(&error, Some(&snapshot));

        assert_eq!(
            guidance.suggestions[0],
            "Column 'amount' not found. Did you mean: sales.sale_amount?"
        );
        assert_eq!(guidance.available_tables.len(), 3);
        assert_eq!(guidance.available_tables[0].columns, vec!["id", "full_name", "created_at"]);
    }

    #[test]
    fn test_mysql_unknown_column_with_qualifier() {
        let snapshot = snapshot();
        let error = QueryError::execution_error("Unknown column 'u.name' in 'field list'");
        let guidance = build_guidance(&error, Some(&snapshot));
        assert_eq!(
            guidance.suggestions[0],
            "Column 'name' not found. Did you mean: users.full_name?"
        );
    }

    #[test]
    fn test_unknown_table_suggestions() {
        let snapshot = snapshot();
        let error = QueryError::execution_error("no such table: user");
        let guidance = build_guidance(&error, Some(&snapshot));
        assert_eq!(guidance.suggestions[0], "Table 'user' not found. Did you mean: users?");
    }

    #[test]
    fn test_guidance_without_schema() {
        let error = QueryError::schema_unavailable("database is down");
        let guidance = build_guidance(&error, None);
        assert!(guidance.available_tables.is_empty());
        assert!(guidance.example_questions.is_empty());
        assert_eq!(guidance.suggestions, vec!["Check the database connection settings and try again"]);
    }
}
