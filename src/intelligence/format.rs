//! Result formatting and statement classification

use serde::{Deserialize, Serialize};

use crate::engine::QueryResult;
use crate::safety::leading_verb;
use crate::schema::display_value;

/// Records listed in a summary before the "more records" tail
pub const MAX_SUMMARY_RECORDS: usize = 10;

pub const NO_DATA: &str = "No data found matching the query criteria.";

/// Rough intent of an executed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Count,
    Aggregation,
    SortedData,
    DataRetrieval,
    SchemaInfo,
    TableSchema,
    Other,
}

impl QueryType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Aggregation => "aggregation",
            Self::SortedData => "sorted_data",
            Self::DataRetrieval => "data_retrieval",
            Self::SchemaInfo => "schema_info",
            Self::TableSchema => "table_schema",
            Self::Other => "other",
        }
    }
}

/// Classify a statement by verb and clauses
pub fn classify_query_type(sql: &str) -> QueryType {
    let upper = sql.to_uppercase();
    match leading_verb(sql).as_deref() {
        Some("SELECT") if upper.contains("COUNT(") => QueryType::Count,
        Some("SELECT") if upper.contains("GROUP BY") => QueryType::Aggregation,
        Some("SELECT") if upper.contains("ORDER BY") => QueryType::SortedData,
        Some("SELECT") => QueryType::DataRetrieval,
        Some("SHOW") => QueryType::SchemaInfo,
        Some("DESCRIBE" | "DESC") => QueryType::TableSchema,
        _ => QueryType::Other,
    }
}

/// Compact natural-language rendering of a result
pub fn summarize(result: &QueryResult) -> String {
    if result.rows.is_empty() {
        if result.columns.is_empty() {
            if let Some(affected) = result.rows_affected {
                return format!("Query executed successfully. Rows affected: {affected}");
            }
        }
        return NO_DATA.to_string();
    }

    let mut lines = vec![format!("Found {} record(s):", result.rows.len()), String::new()];

    for (i, row) in result.rows.iter().take(MAX_SUMMARY_RECORDS).enumerate() {
        let cells: Vec<String> = result
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| format!("{column}: {}", display_value(value)))
            .collect();
        lines.push(format!("Record {}: {}", i + 1, cells.join(" | ")));
    }

    if result.rows.len() > MAX_SUMMARY_RECORDS {
        lines.push(format!("... and {} more records", result.rows.len() - MAX_SUMMARY_RECORDS));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(rows: usize) -> QueryResult {
        QueryResult {
            columns: vec!["id".into(), "name".into()],
            rows: (1..=rows).map(|i| vec![json!(i), json!(format!("user{i}"))]).collect(),
            rows_affected: None,
        }
    }

    #[test]
    fn test_summary_two_records() {
        insta::assert_snapshot!(summarize(&result(2)), @r"
        Found 2 record(s):

        Record 1: id: 1 | name: user1
        Record 2: id: 2 | name: user2
        ");
    }

    #[test]
    fn test_summary_tail() {
        let text = summarize(&result(12));
        assert!(text.starts_with("Found 12 record(s):\n\nRecord 1: id: 1 | name: user1"));
        assert!(text.contains("Record 10: id: 10 | name: user10"));
        assert!(!text.contains("Record 11"));
        assert!(text.ends_with("... and 2 more records"));
    }

    #[test]
    fn test_summary_empty() {
        assert_eq!(summarize(&result(0)), NO_DATA);
        assert_eq!(summarize(&QueryResult::default()), NO_DATA);
    }

    #[test]
    fn test_summary_null_cell() {
        let result = QueryResult {
            columns: vec!["email".into()],
            rows: vec![vec![json!(null)]],
            rows_affected: None,
        };
        assert_eq!(summarize(&result), "Found 1 record(s):\n\nRecord 1: email: NULL");
    }

    #[test]
    fn test_classify_query_type() {
        assert_eq!(classify_query_type("SELECT COUNT(*) FROM users"), QueryType::Count);
        assert_eq!(
            classify_query_type("select region, sum(amount) from sales group by region"),
            QueryType::Aggregation
        );
        assert_eq!(
            classify_query_type("SELECT * FROM sales ORDER BY created_at DESC"),
            QueryType::SortedData
        );
        assert_eq!(classify_query_type("SELECT * FROM users"), QueryType::DataRetrieval);
        assert_eq!(classify_query_type("SHOW TABLES"), QueryType::SchemaInfo);
        assert_eq!(classify_query_type("DESC users"), QueryType::TableSchema);
        assert_eq!(classify_query_type("EXPLAIN SELECT 1"), QueryType::Other);
    }
}
