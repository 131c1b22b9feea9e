//! Validation stages
//!
//! Each stage is a free function over the statement text that appends findings.
//! Stages never short-circuit each other.

use regex::Regex;
use std::sync::LazyLock;

use crate::profile::DomainProfile;
use crate::safety::{leading_verb, strip_comments, ALLOWED_VERBS};
use crate::validation::{ValidationLevel, ValidationResult, ValidationSettings, ValidationStage};

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+[`"\[]?(\w+)[`"\]]?(?:\.[`"\[]?(\w+))?"#)
        .expect("table reference pattern")
});

static QUALIFIED_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)SELECT\s+[a-zA-Z_]\w*\.[a-zA-Z_]\w*").expect("qualified select pattern")
});

static FROM_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+\w+").expect("from clause pattern"));

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("limit clause pattern"));

static JOIN_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bJOIN\b").expect("join pattern"));

static FROM_OR_JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\b").expect("from/join pattern"));

static SUBQUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*SELECT\b").expect("subquery pattern"));

static AGGREGATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(COUNT|SUM|AVG|MAX|MIN)\s*\(").expect("aggregate pattern")
});

static ORDER_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\s+([\w.`]+)").expect("order by pattern"));

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)'\s*OR\s*'1'\s*=\s*'1'", r"(?i);\s*DROP\s+TABLE", r"(?i)UNION\s+SELECT"]
        .iter()
        .map(|p| Regex::new(p).expect("injection pattern"))
        .collect()
});

const TIME_WORDS: &[&str] = &["recent", "latest", "today", "yesterday"];

const DATE_HINTS: &[&str] =
    &["date", "time", "tgl", "_at", "created", "updated", "day", "month", "year"];

/// Tables named after `FROM`/`JOIN`, in order of appearance, deduplicated
///
/// A `schema.table` reference yields `table`.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for capture in TABLE_REFERENCE.captures_iter(sql) {
        let Some(name) = capture.get(2).or_else(|| capture.get(1)) else {
            continue;
        };
        let name = name.as_str();
        if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            tables.push(name.to_string());
        }
    }
    tables
}

/// Structural size of a statement
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryComplexity {
    pub table_count: usize,
    pub join_count: usize,
    pub subquery_count: usize,
    pub aggregate_functions: Vec<String>,
    pub complexity_score: f64,
}

impl QueryComplexity {
    pub fn analyze(sql: &str) -> Self {
        let table_count = FROM_OR_JOIN.find_iter(sql).count();
        let join_count = JOIN_KEYWORD.find_iter(sql).count();
        let subquery_count = SUBQUERY.find_iter(sql).count();
        let aggregate_functions: Vec<String> =
            AGGREGATE.captures_iter(sql).map(|c| c[1].to_uppercase()).collect();

        #[allow(clippy::cast_precision_loss)]
        let complexity_score = table_count as f64
            + join_count as f64 * 2.0
            + subquery_count as f64 * 3.0
            + aggregate_functions.len() as f64 * 1.5;

        Self { table_count, join_count, subquery_count, aggregate_functions, complexity_score }
    }
}

pub(crate) fn syntax(sql: &str, out: &mut Vec<ValidationResult>) {
    let verb = leading_verb(sql);
    if !verb.as_deref().is_some_and(|v| ALLOWED_VERBS.contains(&v)) {
        out.push(
            ValidationResult::new(
                ValidationStage::Syntax,
                ValidationLevel::Error,
                format!("Query must start with one of: {}", ALLOWED_VERBS.join(", ")),
            )
            .with_suggestion("Use SELECT to query data from tables"),
        );
    }

    if QUALIFIED_SELECT.is_match(sql) && !FROM_CLAUSE.is_match(sql) {
        // No safe rewrite exists; the fix is left to regeneration
        out.push(
            ValidationResult::new(
                ValidationStage::Syntax,
                ValidationLevel::Critical,
                "Table aliases used without proper FROM clause",
            )
            .with_suggestion("Define table aliases in FROM clause with JOIN statements")
            .with_correction(sql),
        );
    }
}

pub(crate) fn schema(sql: &str, known_tables: &[&str], out: &mut Vec<ValidationResult>) {
    for table in extract_tables(sql) {
        if known_tables.iter().any(|k| k.eq_ignore_ascii_case(&table)) {
            continue;
        }

        let nearest = nearest_matches(&table, known_tables, 3);
        let suggestion = if nearest.is_empty() {
            let available: Vec<&str> = known_tables.iter().take(5).copied().collect();
            format!("Verify the table name. Available tables: {}", available.join(", "))
        } else {
            format!("Did you mean: {}?", nearest.join(", "))
        };

        out.push(
            ValidationResult::new(
                ValidationStage::Schema,
                ValidationLevel::Warning,
                format!("Table '{table}' is not a known table"),
            )
            .with_suggestion(suggestion),
        );
    }
}

pub(crate) fn business(
    sql: &str,
    question: &str,
    profile: &DomainProfile,
    out: &mut Vec<ValidationResult>,
) {
    let tables = extract_tables(sql);
    let uses = |name: &str| tables.iter().any(|t| t.eq_ignore_ascii_case(name));

    for requirement in &profile.join_requirements {
        if uses(&requirement.left) && uses(&requirement.right) && !uses(&requirement.bridge) {
            out.push(
                ValidationResult::new(
                    ValidationStage::Business,
                    ValidationLevel::Warning,
                    format!(
                        "Query joining {} and {} should include {}",
                        requirement.left, requirement.right, requirement.bridge
                    ),
                )
                .with_suggestion(format!(
                    "Add JOIN with {} to establish the relationship",
                    requirement.bridge
                )),
            );
        }
    }

    let question = question.to_lowercase();
    let time_relative = question
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| TIME_WORDS.contains(&word));
    if time_relative && !orders_by_date(sql) {
        out.push(
            ValidationResult::new(
                ValidationStage::Business,
                ValidationLevel::Info,
                "Time-based queries should include date ordering",
            )
            .with_suggestion("Add ORDER BY on a date column, newest first (DESC)"),
        );
    }
}

pub(crate) fn performance(sql: &str, settings: &ValidationSettings, out: &mut Vec<ValidationResult>) {
    let code = strip_comments(sql);
    let is_select = leading_verb(&code).as_deref() == Some("SELECT");
    if is_select && !LIMIT_CLAUSE.is_match(&code) {
        out.push(
            ValidationResult::new(
                ValidationStage::Performance,
                ValidationLevel::Warning,
                "Query without LIMIT clause may return too many rows",
            )
            .with_suggestion("Add LIMIT clause to control result set size")
            .with_correction(with_limit(sql, settings.default_limit)),
        );
    }

    let join_count = JOIN_KEYWORD.find_iter(sql).count();
    if join_count > settings.max_joins {
        out.push(
            ValidationResult::new(
                ValidationStage::Performance,
                ValidationLevel::Info,
                format!("Complex query with {join_count} JOINs may be slow"),
            )
            .with_suggestion("Consider query optimization or adding appropriate indexes"),
        );
    }
}

pub(crate) fn security(sql: &str, profile: &DomainProfile, out: &mut Vec<ValidationResult>) {
    let lower = sql.to_lowercase();
    let identifiers: Vec<&str> =
        lower.split(|c: char| !(c.is_alphanumeric() || c == '_')).filter(|w| !w.is_empty()).collect();

    let mut flagged: Vec<&str> = Vec::new();
    for column in identifiers {
        if profile.is_sensitive(column) && !flagged.contains(&column) {
            flagged.push(column);
            out.push(
                ValidationResult::new(
                    ValidationStage::Security,
                    ValidationLevel::Warning,
                    format!("Query accesses sensitive column: {column}"),
                )
                .with_suggestion("Ensure proper authorization for accessing sensitive data"),
            );
        }
    }

    for pattern in INJECTION_PATTERNS.iter() {
        if pattern.is_match(sql) {
            out.push(
                ValidationResult::new(
                    ValidationStage::Security,
                    ValidationLevel::Critical,
                    "Potential SQL injection pattern detected",
                )
                .with_suggestion("Review query for malicious content"),
            );
        }
    }
}

/// Append a `LIMIT`, dropping comments and any trailing semicolon first
pub fn with_limit(sql: &str, limit: u32) -> String {
    let code = strip_comments(sql);
    let base = code.trim().trim_end_matches(';').trim_end();
    format!("{base} LIMIT {limit}")
}

fn orders_by_date(sql: &str) -> bool {
    ORDER_BY.captures(sql).is_some_and(|c| {
        let column = c[1].to_lowercase();
        DATE_HINTS.iter().any(|hint| column.contains(hint))
    })
}

/// Candidates closest to `name`, best first
///
/// A candidate qualifies when either name contains the other or their Jaro-Winkler
/// similarity is at least 0.8.
pub fn nearest_matches(name: &str, candidates: &[&str], limit: usize) -> Vec<String> {
    let needle = name.to_lowercase();
    let mut scored: Vec<(f64, &str)> = candidates
        .iter()
        .filter_map(|candidate| {
            let lower = candidate.to_lowercase();
            let score = strsim::jaro_winkler(&needle, &lower);
            let contains = !needle.is_empty() && (lower.contains(&needle) || needle.contains(&lower));
            (contains || score >= 0.8).then_some((score, *candidate))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, c)| c.to_string()).collect()
}
