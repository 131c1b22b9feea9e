//! Schema context rendering
//!
//! Text form of a schema snapshot, written for the drafting oracle: every table with
//! its columns and key roles, row count, one sample row, and inferred relationships,
//! followed by ready-made `JOIN` patterns.

use std::fmt::Write as _;

use crate::graph::{EdgeKind, RelationshipEdge, RelationshipGraph};
use crate::schema::TableSchema;

/// Join patterns listed at the end of the context
const MAX_JOIN_PATTERNS: usize = 10;

/// Render the full schema context
pub fn render_schema_context(database: &str, graph: &RelationshipGraph) -> String {
    let mut out = String::new();
    let names: Vec<&str> = graph.tables().iter().map(TableSchema::name).collect();

    let _ = writeln!(out, "Database: {database}");
    let _ = writeln!(out, "Available tables: {}", names.join(", "));

    for table in graph.tables() {
        out.push('\n');
        render_table(&mut out, table, graph);
    }

    let patterns: Vec<&RelationshipEdge> =
        graph.edges().iter().filter(|e| e.kind == EdgeKind::Direct).take(MAX_JOIN_PATTERNS).collect();
    if !patterns.is_empty() {
        out.push_str("\nJOIN PATTERNS:\n");
        for edge in patterns {
            let _ = writeln!(out, "  - {}", join_clause(edge));
        }
    }

    out
}

fn render_table(out: &mut String, table: &TableSchema, graph: &RelationshipGraph) {
    match table.row_count() {
        Some(rows) => {
            let _ = writeln!(out, "Table: {} ({rows} rows)", table.name());
        }
        None => {
            let _ = writeln!(out, "Table: {}", table.name());
        }
    }

    out.push_str("Columns:\n");
    for column in table.columns() {
        let _ = write!(out, "  - {} {}", column.name, column.data_type);
        if !column.key_role.tag().is_empty() {
            let _ = write!(out, " [{}]", column.key_role.tag());
        }
        out.push_str(if column.nullable { " optional" } else { " required" });
        out.push('\n');
    }

    if let Some(sample) = table.sample_rows() {
        if let Some(row) = sample.rows.first() {
            let cells: Vec<String> = sample
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| format!("{column}: {}", display_value(value)))
                .collect();
            let _ = writeln!(out, "Sample: {}", cells.join(" | "));
        }
    }

    let relationships: Vec<&RelationshipEdge> =
        graph.edges_for(table.name()).filter(|e| e.kind != EdgeKind::Junction).collect();
    if !relationships.is_empty() {
        out.push_str("Relationships:\n");
        for edge in relationships {
            let _ = writeln!(out, "  - {edge}");
        }
    }
}

/// `JOIN target ON source.col = target.col`
pub fn join_clause(edge: &RelationshipEdge) -> String {
    format!("JOIN {} ON {}", edge.target_table, edge.join_condition())
}

/// Plain-text rendering of a cell value
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
