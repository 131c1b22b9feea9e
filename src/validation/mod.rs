//! Query Validation
//!
//! Multi-stage analysis of drafted SQL: syntax, schema, business rules,
//! performance, and security. Every stage runs on every statement and findings are
//! collected in stage order. Findings are advisory; the safety gate in
//! [`crate::safety`] is the only hard stop.
//!
//! [`SelfCorrector`] applies at most one mechanical fix per pass and re-validates the
//! rewritten statement.

mod rules;

use serde::{Deserialize, Serialize};

use crate::profile::DomainProfile;

pub use rules::{extract_tables, nearest_matches, with_limit, QueryComplexity};

/// Severity of a finding, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl ValidationLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Stage that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStage {
    Syntax,
    Schema,
    Business,
    Performance,
    Security,
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub stage: ValidationStage,
    pub level: ValidationLevel,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    pub auto_correctable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_sql: Option<String>,
}

impl ValidationResult {
    pub fn new(stage: ValidationStage, level: ValidationLevel, message: impl Into<String>) -> Self {
        Self {
            stage,
            level,
            message: message.into(),
            suggestion: None,
            auto_correctable: false,
            corrected_sql: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Mark the finding auto-correctable with the given rewrite
    #[must_use]
    pub fn with_correction(mut self, sql: impl Into<String>) -> Self {
        self.auto_correctable = true;
        self.corrected_sql = Some(sql.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.level == ValidationLevel::Critical
    }
}

/// True when any finding is critical
pub fn has_critical(results: &[ValidationResult]) -> bool {
    results.iter().any(ValidationResult::is_critical)
}

/// Validator tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Limit appended by the missing-`LIMIT` fix
    pub default_limit: u32,

    /// Joins above this count raise a performance note
    pub max_joins: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self { default_limit: 100, max_joins: 3 }
    }
}

/// Runs the validation stages against one schema
#[derive(Debug, Clone)]
pub struct QueryValidator<'a> {
    known_tables: Vec<&'a str>,
    profile: &'a DomainProfile,
    settings: ValidationSettings,
}

impl<'a> QueryValidator<'a> {
    pub fn new<S: AsRef<str>>(
        known_tables: &'a [S],
        profile: &'a DomainProfile,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            known_tables: known_tables.iter().map(|t| t.as_ref()).collect(),
            profile,
            settings,
        }
    }

    /// All findings for a statement, in stage order
    pub fn validate(&self, sql: &str, question: &str) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        rules::syntax(sql, &mut results);
        rules::schema(sql, &self.known_tables, &mut results);
        rules::business(sql, question, self.profile, &mut results);
        rules::performance(sql, &self.settings, &mut results);
        rules::security(sql, self.profile, &mut results);
        results
    }

    pub fn analyze_complexity(&self, sql: &str) -> QueryComplexity {
        QueryComplexity::analyze(sql)
    }
}

/// Outcome of one correction pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    /// Statement after the fix, or the input when nothing applied
    pub sql: String,

    /// Findings for `sql`
    pub results: Vec<ValidationResult>,

    /// The finding whose fix was applied
    pub applied: Option<ValidationResult>,
}

impl Correction {
    pub fn corrected(&self) -> bool {
        self.applied.is_some()
    }
}

/// Applies auto-correctable fixes
#[derive(Debug, Clone)]
pub struct SelfCorrector<'a> {
    validator: QueryValidator<'a>,
}

impl<'a> SelfCorrector<'a> {
    pub fn new(validator: QueryValidator<'a>) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &QueryValidator<'a> {
        &self.validator
    }

    /// Validate, apply the first effective fix, and re-validate once
    ///
    /// Critical fixes are tried before others. A fix that leaves the statement
    /// unchanged is skipped.
    pub fn auto_correct(&self, sql: &str, question: &str) -> Correction {
        let results = self.validator.validate(sql, question);

        let candidate = results
            .iter()
            .filter(|r| r.auto_correctable && r.is_critical())
            .chain(results.iter().filter(|r| r.auto_correctable && !r.is_critical()))
            .find(|r| r.corrected_sql.as_deref().is_some_and(|fixed| fixed.trim() != sql.trim()))
            .cloned();

        let Some(applied) = candidate else {
            return Correction { sql: sql.to_string(), results, applied: None };
        };

        let fixed = applied.corrected_sql.clone().unwrap_or_else(|| sql.to_string());
        tracing::debug!(finding = %applied.message, "applied SQL correction");
        let results = self.validator.validate(&fixed, question);
        Correction { sql: fixed, results, applied: Some(applied) }
    }

    /// Human-readable suggestions, `LEVEL: suggestion`
    pub fn suggest_improvements(&self, sql: &str, question: &str) -> Vec<String> {
        self.validator
            .validate(sql, question)
            .into_iter()
            .filter_map(|r| {
                r.suggestion.map(|s| format!("{}: {s}", r.level.as_str().to_uppercase()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TABLES: &[&str] = &["users", "sales", "products"];

    fn messages(results: &[ValidationResult]) -> Vec<&str> {
        results.iter().map(|r| r.message.as_str()).collect()
    }

    #[test]
    fn test_clean_query_has_no_findings() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let results = validator.validate("SELECT COUNT(*) FROM users LIMIT 10", "how many users?");
        assert!(results.is_empty(), "unexpected findings: {results:?}");
    }

    #[test]
    fn test_missing_limit_is_fixed_once() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let corrector = SelfCorrector::new(validator);

        let correction = corrector.auto_correct("SELECT * FROM users;", "list users");
        assert!(correction.corrected());
        assert_eq!(correction.sql, "SELECT * FROM users LIMIT 100");
        assert!(correction.results.is_empty());

        let again = corrector.auto_correct(&correction.sql, "list users");
        assert!(!again.corrected());
        assert_eq!(again.sql, correction.sql);
    }

    #[test]
    fn test_limit_in_comment_does_not_count() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let corrector = SelfCorrector::new(validator);

        let correction = corrector.auto_correct("SELECT * FROM users -- every user", "list users");
        assert!(correction.corrected());
        assert_eq!(correction.sql, "SELECT * FROM users LIMIT 100");
        assert!(correction.results.is_empty());

        let commented = corrector.auto_correct("SELECT * FROM users /* LIMIT 5 */", "list users");
        assert_eq!(commented.sql, "SELECT * FROM users LIMIT 100");
    }

    #[test]
    fn test_limit_not_suggested_for_show() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        assert!(validator.validate("SHOW TABLES", "what tables exist").is_empty());
    }

    #[test]
    fn test_alias_without_from_is_critical_but_not_applied() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let corrector = SelfCorrector::new(validator);

        let sql = "SELECT u.name LIMIT 5";
        let correction = corrector.auto_correct(sql, "names");
        assert!(!correction.corrected());
        assert_eq!(correction.sql, sql);
        assert!(has_critical(&correction.results));
        assert_eq!(
            messages(&correction.results),
            vec!["Table aliases used without proper FROM clause"]
        );
    }

    #[test]
    fn test_critical_alias_then_limit_fix() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let correction = SelfCorrector::new(validator).auto_correct("SELECT u.name", "names");
        assert_eq!(correction.sql, "SELECT u.name LIMIT 100");
        assert!(has_critical(&correction.results));
    }

    #[test]
    fn test_unknown_table_suggests_nearest() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let results = validator.validate("SELECT * FROM user LIMIT 5", "users");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].stage, ValidationStage::Schema);
        assert_eq!(results[0].level, ValidationLevel::Warning);
        assert_eq!(results[0].message, "Table 'user' is not a known table");
        assert_eq!(results[0].suggestion.as_deref(), Some("Did you mean: users?"));
    }

    #[test]
    fn test_injection_patterns() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());

        let results = validator
            .validate("SELECT * FROM users WHERE name = '' OR '1'='1' LIMIT 5", "users");
        assert!(has_critical(&results));
        assert!(messages(&results).contains(&"Potential SQL injection pattern detected"));

        let union = validator
            .validate("SELECT name FROM users UNION SELECT name FROM products LIMIT 5", "names");
        assert!(has_critical(&union));
    }

    #[test]
    fn test_sensitive_column_warning() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let results = validator.validate("SELECT u.email FROM users u LIMIT 5", "emails");
        assert_eq!(messages(&results), vec!["Query accesses sensitive column: email"]);
    }

    #[test]
    fn test_sensitive_column_reported_once() {
        let profile = DomainProfile { sensitive_columns: vec!["SSN".into()], ..DomainProfile::default() };
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let results =
            validator.validate("SELECT ssn FROM users WHERE ssn IS NOT NULL LIMIT 5", "ssn");
        assert_eq!(messages(&results), vec!["Query accesses sensitive column: ssn"]);
    }

    #[test]
    fn test_missing_bridge_table() {
        let profile = DomainProfile::hospital();
        let tables = ["pasien", "dokter", "reg_periksa"];
        let validator = QueryValidator::new(&tables, &profile, ValidationSettings::default());
        let results = validator.validate(
            "SELECT * FROM pasien JOIN dokter ON pasien.kd_dokter = dokter.kd_dokter LIMIT 5",
            "patients and doctors",
        );
        assert!(results
            .iter()
            .any(|r| r.stage == ValidationStage::Business && r.message.contains("reg_periksa")));
    }

    #[test]
    fn test_time_words_want_date_ordering() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());

        let unordered = validator.validate("SELECT * FROM sales LIMIT 5", "latest sales");
        assert_eq!(messages(&unordered), vec!["Time-based queries should include date ordering"]);

        let ordered = validator
            .validate("SELECT * FROM sales ORDER BY created_at DESC LIMIT 5", "latest sales");
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_many_joins_note() {
        let profile = DomainProfile::default();
        let settings = ValidationSettings { max_joins: 1, ..ValidationSettings::default() };
        let validator = QueryValidator::new(TABLES, &profile, settings);
        let results = validator.validate(
            "SELECT * FROM sales JOIN users ON sales.user_id = users.id \
             JOIN products ON sales.product_id = products.id LIMIT 5",
            "sales",
        );
        assert_eq!(messages(&results), vec!["Complex query with 2 JOINs may be slow"]);
    }

    #[test]
    fn test_suggest_improvements() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let suggestions =
            SelfCorrector::new(validator).suggest_improvements("SELECT * FROM users", "users");
        assert_eq!(suggestions, vec!["WARNING: Add LIMIT clause to control result set size"]);
    }

    #[test]
    fn test_non_read_statement_is_error() {
        let profile = DomainProfile::default();
        let validator = QueryValidator::new(TABLES, &profile, ValidationSettings::default());
        let results = validator.validate("DELETE FROM users", "remove users");
        assert_eq!(results[0].stage, ValidationStage::Syntax);
        assert_eq!(results[0].level, ValidationLevel::Error);
    }
}
