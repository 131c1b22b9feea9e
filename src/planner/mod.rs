//! Query Planner
//!
//! Decides, before any SQL exists, whether a question needs more than one table and
//! how complex the query is likely to be.
//!
//! Classification is a fixed, ordered rule table ([`PLAN_RULES`]). Every rule sees the
//! same extracted [`PlanSignals`]; outcomes are additive (multi-table is OR-ed,
//! complexity takes the maximum), so rule order only affects the reported rule list.

use serde::{Deserialize, Serialize};

use crate::profile::DomainProfile;
use crate::schema::SchemaSnapshot;

/// Expected query complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

/// Planner verdict for one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub requires_multiple_tables: bool,
    pub complexity: Complexity,
    pub mentioned_tables: Vec<String>,
    pub relationship_indicators: Vec<String>,
    pub suggested_tables: Vec<String>,

    /// Keyword categories found in the question
    pub categories: Vec<String>,

    /// Rules that fired, in table order
    pub matched_rules: Vec<String>,
}

/// Words that suggest data from several tables is combined
pub const CONNECTIVES: &[&str] = &[
    "join", "with", "by", "across", "between", "including", "along with", "together", "combined",
    "related", "each", "per",
];

const AGGREGATION_PHRASES: &[&str] =
    &["total", "sum", "count", "average", "avg", "max", "maximum", "min", "minimum", "how many"];

const GROUPING_PHRASES: &[&str] = &["by", "per", "for each", "each", "group"];

/// Facts extracted from a question that the rules decide on
#[derive(Debug, Clone, Default)]
pub struct PlanSignals {
    pub mentioned_tables: Vec<String>,
    pub categories: Vec<String>,
    pub connectives: Vec<String>,
    pub has_aggregation: bool,
    pub has_grouping: bool,
    pub multi_table_pair: bool,
    pub schema_tables: usize,
}

/// Multi-table outcome of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiTable {
    Yes,
    No,
    /// Only when the schema has more than one table
    IfSchemaHasMany,
}

/// One row of the classification table
#[derive(Debug, Clone, Copy)]
pub struct PlanRule {
    pub name: &'static str,
    pub applies: fn(&PlanSignals) -> bool,
    pub multi_table: MultiTable,
    pub complexity: Complexity,
}

/// Classification rules in evaluation order
pub const PLAN_RULES: &[PlanRule] = &[
    PlanRule {
        name: "multiple_tables_mentioned",
        applies: |s| s.mentioned_tables.len() >= 2,
        multi_table: MultiTable::Yes,
        complexity: Complexity::Complex,
    },
    PlanRule {
        name: "multiple_categories",
        applies: |s| s.categories.len() >= 2,
        multi_table: MultiTable::Yes,
        complexity: Complexity::Complex,
    },
    PlanRule {
        name: "connective",
        applies: |s| !s.connectives.is_empty() && s.schema_tables > 1,
        multi_table: MultiTable::Yes,
        complexity: Complexity::Moderate,
    },
    PlanRule {
        name: "multi_table_pair",
        applies: |s| s.multi_table_pair,
        multi_table: MultiTable::Yes,
        complexity: Complexity::Complex,
    },
    PlanRule {
        name: "grouped_aggregation",
        applies: |s| s.has_aggregation && s.has_grouping,
        multi_table: MultiTable::IfSchemaHasMany,
        complexity: Complexity::Moderate,
    },
    PlanRule {
        name: "single_table",
        applies: |_| true,
        multi_table: MultiTable::No,
        complexity: Complexity::Simple,
    },
];

/// Question classifier
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    profile: DomainProfile,
}

impl QueryPlanner {
    pub fn new(profile: DomainProfile) -> Self {
        Self { profile }
    }

    /// Classify a question against a schema snapshot
    pub fn classify(&self, question: &str, snapshot: &SchemaSnapshot) -> QueryPlan {
        self.classify_tables(question, &snapshot.table_names())
    }

    /// Classify a question against a list of table names
    pub fn classify_tables<S: AsRef<str>>(&self, question: &str, tables: &[S]) -> QueryPlan {
        let signals = self.signals(question, tables);

        let mut requires_multiple_tables = false;
        let mut complexity = Complexity::Simple;
        let mut matched_rules = Vec::new();

        for rule in PLAN_RULES.iter().filter(|r| (r.applies)(&signals)) {
            requires_multiple_tables |= match rule.multi_table {
                MultiTable::Yes => true,
                MultiTable::No => false,
                MultiTable::IfSchemaHasMany => signals.schema_tables > 1,
            };
            complexity = complexity.max(rule.complexity);
            matched_rules.push(rule.name.to_string());
        }

        let mut suggested_tables = signals.mentioned_tables.clone();
        for category in &signals.categories {
            let Some(category) = self.profile.category(category) else {
                continue;
            };
            for table in tables.iter().map(|t| t.as_ref()) {
                if category.matches_table(table) && !suggested_tables.iter().any(|t| t == table) {
                    suggested_tables.push(table.to_string());
                }
            }
        }

        QueryPlan {
            requires_multiple_tables,
            complexity,
            mentioned_tables: signals.mentioned_tables,
            relationship_indicators: signals.connectives,
            suggested_tables,
            categories: signals.categories,
            matched_rules,
        }
    }

    /// Extract rule inputs from a question
    pub fn signals<S: AsRef<str>>(&self, question: &str, tables: &[S]) -> PlanSignals {
        let lower = question.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
            .collect();
        let padded = format!(" {} ", words.join(" "));
        let has_phrase = |phrase: &str| padded.contains(&format!(" {phrase} "));

        let mentioned_tables = tables
            .iter()
            .map(|t| t.as_ref())
            .filter(|table| table_mentioned(table, &words, &padded))
            .map(ToString::to_string)
            .collect();

        let categories: Vec<String> = self
            .profile
            .keyword_categories
            .iter()
            .filter(|c| c.matches_words(&words))
            .map(|c| c.name.clone())
            .collect();

        let multi_table_pair = self.profile.multi_table_pairs.iter().any(|(a, b)| {
            categories.iter().any(|c| c == a) && categories.iter().any(|c| c == b)
        });

        PlanSignals {
            mentioned_tables,
            connectives: CONNECTIVES
                .iter()
                .filter(|c| has_phrase(c))
                .map(ToString::to_string)
                .collect(),
            has_aggregation: AGGREGATION_PHRASES.iter().any(|p| has_phrase(p)),
            has_grouping: GROUPING_PHRASES.iter().any(|p| has_phrase(p)),
            categories,
            multi_table_pair,
            schema_tables: tables.len(),
        }
    }
}

/// Whether a table is named in the question
///
/// Matches the name as a word, its singular form, and the underscore-to-space form
/// (`reg_periksa` → "reg periksa").
fn table_mentioned(table: &str, words: &[&str], padded: &str) -> bool {
    let name = table.to_lowercase();
    if words.contains(&name.as_str()) {
        return true;
    }
    if name.contains('_') && padded.contains(&format!(" {} ", name.replace('_', " "))) {
        return true;
    }
    singular(&name).is_some_and(|s| words.contains(&s.as_str()))
}

fn singular(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_suffix("ies") {
        return Some(format!("{stem}y"));
    }
    if let Some(stem) = name.strip_suffix("xes") {
        return Some(format!("{stem}x"));
    }
    name.strip_suffix('s').filter(|s| !s.is_empty()).map(ToString::to_string)
}
