//! Safety Gate
//!
//! The last check before a statement reaches a database. Validation findings are
//! advisory; this gate is not. A statement passes only if:
//! - it starts with `SELECT`, `SHOW`, `DESCRIBE`, `DESC` or `EXPLAIN`
//! - it contains none of the write/DDL/privilege keywords as a standalone word
//! - it contains no semicolon other than a single trailing one
//!
//! # Validation Strategy
//! - Semicolons and forbidden keywords are checked on the raw text, comments and
//!   string literals included
//! - Comments are stripped only to find the leading verb (`--` and `/* */`)
//! - Conservative approach: anything uncertain is rejected

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{QueryError, Result};

/// Statement verbs the gate lets through
pub const ALLOWED_VERBS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Keywords that are rejected anywhere in the statement
pub const FORBIDDEN_KEYWORDS: &[&str] =
    &["INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE"];

static FORBIDDEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = FORBIDDEN_KEYWORDS.join("|");
    Regex::new(&format!(r"\b({alternation})\b")).expect("forbidden keyword pattern is valid")
});

/// Reject anything that is not a single read-only statement
///
/// # Errors
/// * `InvalidInput` if the statement is empty
/// * `SafetyRejected` if any gate rule fails
pub fn assert_safe(sql: &str) -> Result<()> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(QueryError::invalid_input("Query cannot be empty"));
    }
    let raw = trimmed.to_uppercase();

    let without_terminator = raw.strip_suffix(';').unwrap_or(&raw).trim_end();
    if without_terminator.contains(';') {
        return Err(QueryError::safety_rejected("Multiple statements not allowed"));
    }

    match leading_verb(&strip_comments(&raw)) {
        Some(verb) if ALLOWED_VERBS.contains(&verb.as_str()) => {}
        _ => {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(QueryError::safety_rejected(format!(
                "Only {} queries are allowed. Got: {preview}",
                ALLOWED_VERBS.join(", ")
            )));
        }
    }

    if let Some(found) = FORBIDDEN_PATTERN.find(&raw) {
        return Err(QueryError::safety_rejected(format!(
            "Forbidden keyword '{}' found in query",
            found.as_str()
        )));
    }

    Ok(())
}

/// Boolean form of [`assert_safe`]
#[must_use]
pub fn is_safe(sql: &str) -> bool {
    assert_safe(sql).is_ok()
}

/// First keyword of a statement, uppercased
///
/// Leading whitespace and opening parentheses are skipped.
#[must_use]
pub fn leading_verb(sql: &str) -> Option<String> {
    let verb: String = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();

    if verb.is_empty() {
        None
    } else {
        Some(verb.to_uppercase())
    }
}

/// Strip SQL comments from query
///
/// Handles:
/// - Line comments: -- comment
/// - Block comments: /* comment */
///
/// Text inside `'...'`, `"..."` and backtick spans is copied unchanged.
pub(crate) fn strip_comments(sql: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                result.push(ch);
                for inner in chars.by_ref() {
                    result.push(inner);
                    if inner == ch {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for ch in chars.by_ref() {
                    if prev == '*' && ch == '/' {
                        break;
                    }
                    prev = ch;
                }
                result.push(' ');
            }
            _ => result.push(ch),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_limited_select() {
        assert!(assert_safe("SELECT * FROM t LIMIT 10").is_ok());
    }

    #[test]
    fn test_rejects_stacked_drop() {
        let err = assert_safe("SELECT * FROM t; DROP TABLE t;").unwrap_err();
        assert_eq!(err.error_code(), "SAFETY_REJECTED");
    }

    #[test]
    fn test_trailing_semicolon_allowed() {
        assert!(assert_safe("SELECT * FROM users;").is_ok());
    }

    #[test]
    fn test_empty_query() {
        let err = assert_safe("   ").unwrap_err();
        assert!(err.message().contains("Query cannot be empty"));
    }

    #[test]
    fn test_allowed_verbs() {
        assert!(assert_safe("SHOW TABLES").is_ok());
        assert!(assert_safe("DESCRIBE users").is_ok());
        assert!(assert_safe("DESC users").is_ok());
        assert!(assert_safe("EXPLAIN SELECT * FROM users").is_ok());
        assert!(assert_safe("select count(*) from users").is_ok());
    }

    #[test]
    fn test_rejects_write_statements() {
        for sql in [
            "INSERT INTO users (name) VALUES ('x')",
            "UPDATE users SET name = 'x'",
            "DELETE FROM users",
            "DROP TABLE users",
            "ALTER TABLE users ADD COLUMN x INT",
            "CREATE TABLE x (id INT)",
            "TRUNCATE users",
            "GRANT ALL ON users TO bob",
            "REVOKE ALL ON users FROM bob",
        ] {
            assert!(assert_safe(sql).is_err(), "should reject: {sql}");
        }
    }

    #[test]
    fn test_rejects_forbidden_keyword_inside_select() {
        let err = assert_safe("SELECT * FROM users WHERE id IN (DELETE FROM x)").unwrap_err();
        assert!(err.message().contains("Forbidden keyword 'DELETE'"));
    }

    #[test]
    fn test_keyword_must_be_standalone() {
        assert!(assert_safe("SELECT updated_at, created_by FROM audit_log").is_ok());
        assert!(assert_safe("SELECT * FROM orders WHERE status = 'DELETED'").is_ok());
    }

    #[test]
    fn test_comments_are_stripped() {
        assert!(assert_safe("-- list users\nSELECT * FROM users /* all */").is_ok());
        assert!(assert_safe("/* hi */ SELECT 1").is_ok());
    }

    #[test]
    fn test_comment_markers_inside_literals_do_not_hide_statements() {
        for sql in [
            "SELECT '--' FROM t; DROP TABLE t",
            "SELECT '/*' FROM t; DELETE FROM t; SELECT '*/'",
            "SELECT \"--\" FROM t WHERE x = 1; UPDATE t SET x = 2",
        ] {
            let err = assert_safe(sql).unwrap_err();
            assert_eq!(err.error_code(), "SAFETY_REJECTED", "{sql}");
        }
    }

    #[test]
    fn test_forbidden_keyword_in_comment_is_rejected() {
        assert!(assert_safe("SELECT * FROM users -- then DROP TABLE users").is_err());
        assert!(assert_safe("SELECT 1 /* ; */").is_err());
    }

    #[test]
    fn test_strip_comments_keeps_literals() {
        assert_eq!(strip_comments("SELECT '--' FROM t -- note"), "SELECT '--' FROM t ");
        assert_eq!(strip_comments("SELECT `a/*b` /* c */ FROM t"), "SELECT `a/*b`   FROM t");
        assert_eq!(strip_comments("SELECT 'it''s' -- x\nFROM t"), "SELECT 'it''s' \nFROM t");
    }

    #[test]
    fn test_rejects_cte_and_other_verbs() {
        assert!(assert_safe("WITH x AS (SELECT 1) SELECT * FROM x").is_err());
        assert!(assert_safe("PRAGMA table_info(users)").is_err());
        assert!(assert_safe("VACUUM").is_err());
    }

    #[test]
    fn test_leading_verb() {
        assert_eq!(leading_verb("  select 1"), Some("SELECT".to_string()));
        assert_eq!(leading_verb("(SELECT 1)"), Some("SELECT".to_string()));
        assert_eq!(leading_verb("123"), None);
    }
}
