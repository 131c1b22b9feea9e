//! Prompt construction and oracle output cleaning

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::graph::RelationshipEdge;
use crate::planner::QueryPlan;
use crate::profile::Workflow;
use crate::safety::{leading_verb, ALLOWED_VERBS};
use crate::schema::join_clause;

/// Marker that opens the multi-table block of an enriched context
pub const MULTI_TABLE_HEADER: &str = "=== MULTI-TABLE QUERY GUIDANCE ===";

/// Built-in prompt; `{schema_context}` and `{question}` are substituted
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are a SQL expert specializing in multi-table queries. Convert the natural language question to a safe, accurate SQL query.

DATABASE SCHEMA:
{schema_context}

CRITICAL RULES:
- Only SELECT, SHOW, DESCRIBE queries (READ-ONLY)
- Never INSERT, UPDATE, DELETE, DROP, ALTER
- Use exact table and column names from the schema above
- Include LIMIT clause (max 100 rows unless specifically requested)
- Always use proper JOIN syntax for multi-table queries

MULTI-TABLE QUERY STRATEGY:
1. Identify ALL tables mentioned or implied in the question
2. Use the JOIN PATTERNS section above to find correct join paths
3. For 3+ table queries, use the provided join examples as templates
4. Always specify the full table.column format for ambiguous columns
5. Use appropriate JOIN types (INNER JOIN is default)

SINGLE TABLE EXAMPLES:
- "How many users?" -> SELECT COUNT(*) FROM users
- "Recent sales" -> SELECT * FROM sales ORDER BY date DESC LIMIT 20
- "Top products" -> SELECT product, COUNT(*) AS sales_count FROM sales GROUP BY product ORDER BY sales_count DESC LIMIT 10

AGGREGATION WITH JOINS:
- Always use proper GROUP BY when joining tables with aggregation
- Use table aliases for complex queries: SELECT u.name, COUNT(s.id) FROM users u JOIN sales s ON u.id = s.user_id GROUP BY u.id
- Include meaningful column names in SELECT

USER QUESTION: {question}

Generate ONLY the SQL query, no explanation:"#;

/// Keywords that continue a statement onto the next line
const CONTINUATION_KEYWORDS: &[&str] = &[
    "FROM", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "ON", "WHERE", "AND", "OR",
    "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "UNION",
];

const LABEL_PREFIXES: &[&str] =
    &["Query:", "SQL:", "Answer:", "Result:", "SELECT:", "SHOW:", "DESCRIBE:"];

/// Fill a prompt template
pub fn build_prompt(template: Option<&str>, schema_context: &str, question: &str) -> String {
    template
        .unwrap_or(DEFAULT_PROMPT_TEMPLATE)
        .replace("{schema_context}", schema_context)
        .replace("{question}", question)
}

/// Append the multi-table block to a schema context
///
/// Lists the planner's table suggestions, the computed join path as `JOIN … ON …`
/// clauses, a chained example statement, and any workflows that involve the tables.
pub fn enhance_for_multi_table(
    schema_context: &str,
    plan: &QueryPlan,
    join_path: &[RelationshipEdge],
    workflows: &[&Workflow],
) -> String {
    let mut out = String::with_capacity(schema_context.len() + 1024);
    out.push_str(schema_context.trim_end());
    out.push_str("\n\n");
    out.push_str(MULTI_TABLE_HEADER);
    out.push('\n');

    let _ = writeln!(out, "Query complexity: {}", plan.complexity.as_str());
    if !plan.suggested_tables.is_empty() {
        let _ = writeln!(out, "Focus tables: {}", plan.suggested_tables.join(", "));
    }
    if !plan.relationship_indicators.is_empty() {
        let _ = writeln!(out, "Relationship words: {}", plan.relationship_indicators.join(", "));
    }

    if !join_path.is_empty() {
        out.push_str("\nJOIN PATH:\n");
        for edge in join_path {
            let _ = writeln!(out, "  - {}", join_clause(edge));
        }
        if let Some(chain) = chain_query(join_path) {
            let _ = writeln!(out, "  CHAIN: {chain}");
        }
    }

    if !workflows.is_empty() {
        out.push_str("\nWORKFLOWS:\n");
        for workflow in workflows {
            let _ = writeln!(out, "  - {}: {}", workflow.description, workflow.flow);
        }
    }

    out.push_str(
        "\nMulti-table guidance:\n\
         - Join every focus table through the path above\n\
         - Qualify columns as table.column when names repeat\n\
         - GROUP BY the non-aggregated columns when aggregating across joins\n",
    );
    out
}

/// `SELECT * FROM a JOIN b ON … JOIN c ON …` over a join path
///
/// Returns `None` when an edge does not touch the tables joined so far.
pub fn chain_query(join_path: &[RelationshipEdge]) -> Option<String> {
    let first = join_path.first()?;
    let mut joined: HashSet<&str> = HashSet::from([first.source_table.as_str()]);
    let mut sql = format!("SELECT * FROM {}", first.source_table);

    for edge in join_path {
        let next = if joined.contains(edge.source_table.as_str()) {
            edge.target_table.as_str()
        } else if joined.contains(edge.target_table.as_str()) {
            edge.source_table.as_str()
        } else {
            return None;
        };
        if joined.insert(next) {
            let _ = write!(sql, " JOIN {next} ON {}", edge.join_condition());
        }
    }
    Some(sql)
}

/// Extract one SQL statement from raw oracle output
///
/// Drops `<think>…</think>` reasoning, markdown fences, and leading labels, then keeps
/// the first line that starts with an allowed verb (falling back to the first non-empty
/// line). Following lines that open with a clause keyword are kept as part of the
/// statement. A trailing semicolon is removed.
pub fn clean_sql_response(raw: &str) -> String {
    let mut text = raw;

    if text.contains("<think>") {
        if let Some((_, after)) = text.rsplit_once("</think>") {
            text = after;
        }
    }

    if let Some((_, rest)) = text.split_once("```sql") {
        text = rest.split("```").next().unwrap_or(rest);
    } else if let Some((_, rest)) = text.split_once("```") {
        text = rest.split("```").next().unwrap_or(rest);
    }

    let mut text = text.trim();
    for prefix in LABEL_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
        }
    }

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let start = lines
        .iter()
        .position(|line| starts_with_allowed_verb(line))
        .or_else(|| lines.iter().position(|line| !line.is_empty()));

    let Some(start) = start else {
        return String::new();
    };

    let mut statement = lines[start].to_string();
    if !statement.ends_with(';') {
        for line in &lines[start + 1..] {
            if !continues_statement(line) {
                break;
            }
            statement.push(' ');
            statement.push_str(line);
            if line.ends_with(';') {
                break;
            }
        }
    }

    statement.trim_end().trim_end_matches(';').trim().to_string()
}

fn starts_with_allowed_verb(line: &str) -> bool {
    leading_verb(line).is_some_and(|verb| ALLOWED_VERBS.contains(&verb.as_str()))
}

fn continues_statement(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    if line.starts_with(',') || line.starts_with(')') {
        return true;
    }
    let first = line
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_uppercase();
    CONTINUATION_KEYWORDS.contains(&first.as_str())
}
