//! Domain Profile
//!
//! Vocabulary and rules that tune the engine to one database domain: hub tables for
//! join paths, planner keyword categories, required bridge tables, sensitive columns,
//! and named table workflows.
//!
//! The default profile is domain-neutral. [`DomainProfile::hospital`] carries the rules
//! for the SIMRS-style hospital schema (`pasien`, `reg_periksa`, `dokter`, ...).

use serde::{Deserialize, Serialize};

use crate::graph::GraphOptions;

/// A planner keyword category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCategory {
    /// Category name (`patient`, `product`, ...)
    pub name: String,

    /// Words in a question that signal this category (prefix match per word)
    pub keywords: Vec<String>,

    /// Substrings of table names that belong to this category
    pub table_hints: Vec<String>,
}

impl KeywordCategory {
    fn new(name: &str, keywords: &[&str], table_hints: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(ToString::to_string).collect(),
            table_hints: table_hints.iter().map(ToString::to_string).collect(),
        }
    }

    /// Whether any word of the (lowercased) question falls in this category
    pub fn matches_words(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.keywords.iter().any(|k| w.starts_with(k.as_str())))
    }

    /// Whether a table name belongs to this category
    pub fn matches_table(&self, table: &str) -> bool {
        let lower = table.to_lowercase();
        self.table_hints.iter().any(|h| lower.contains(h.as_str()))
    }
}

/// Two tables that must be joined through a bridge table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequirement {
    pub left: String,
    pub right: String,
    pub bridge: String,
}

impl JoinRequirement {
    fn new(left: &str, right: &str, bridge: &str) -> Self {
        Self { left: left.to_string(), right: right.to_string(), bridge: bridge.to_string() }
    }
}

/// A named flow of tables that are usually queried together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    pub tables: Vec<String>,
    pub flow: String,
}

impl Workflow {
    fn new(name: &str, description: &str, tables: &[&str], flow: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tables: tables.iter().map(ToString::to_string).collect(),
            flow: flow.to_string(),
        }
    }

    /// Whether the workflow touches any of the given tables
    pub fn involves<S: AsRef<str>>(&self, tables: &[S]) -> bool {
        tables
            .iter()
            .any(|t| self.tables.iter().any(|w| w.eq_ignore_ascii_case(t.as_ref())))
    }
}

/// A query suggestion derived from a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedQuery {
    pub workflow: String,
    pub description: String,
    pub suggested_query: String,
    pub related_tables: String,
}

/// Domain tuning for planning, validation and context rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainProfile {
    /// Tables preferred as the join-path hub, in priority order
    pub anchor_tables: Vec<String>,

    /// Planner keyword categories
    pub keyword_categories: Vec<KeywordCategory>,

    /// Category pairs that always need more than one table
    pub multi_table_pairs: Vec<(String, String)>,

    /// Table pairs that must be joined through a bridge
    pub join_requirements: Vec<JoinRequirement>,

    /// Column names whose use is flagged by the security stage
    pub sensitive_columns: Vec<String>,

    /// Named table flows
    pub workflows: Vec<Workflow>,
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self {
            anchor_tables: Vec::new(),
            keyword_categories: default_categories(),
            multi_table_pairs: vec![
                ("doctor".to_string(), "patient".to_string()),
                ("doctor".to_string(), "visit".to_string()),
            ],
            join_requirements: Vec::new(),
            sensitive_columns: [
                "password",
                "password_hash",
                "ssn",
                "credit_card",
                "email",
                "phone",
                "address",
                "birth_date",
                "date_of_birth",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            workflows: Vec::new(),
        }
    }
}

impl DomainProfile {
    /// Profile for the hospital information system schema
    pub fn hospital() -> Self {
        Self {
            anchor_tables: vec!["pasien".to_string(), "reg_periksa".to_string()],
            join_requirements: vec![
                JoinRequirement::new("pasien", "dokter", "reg_periksa"),
                JoinRequirement::new("dokter", "pemeriksaan", "reg_periksa"),
                JoinRequirement::new("pasien", "diagnosa_pasien", "reg_periksa"),
            ],
            sensitive_columns: [
                "no_ktp",
                "no_rkm_medis",
                "alamat",
                "no_tlp",
                "email",
                "tgl_lahir",
                "nama_keluarga",
                "diagnosa",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            workflows: vec![
                Workflow::new(
                    "patient_registration",
                    "Patient registration and visit setup",
                    &["pasien", "reg_periksa", "dokter", "poliklinik"],
                    "pasien → reg_periksa → dokter → poliklinik",
                ),
                Workflow::new(
                    "clinical_diagnosis",
                    "Clinical diagnosis and treatment planning",
                    &["reg_periksa", "diagnosa_pasien", "penyakit", "rawat_jl_dr"],
                    "reg_periksa → diagnosa_pasien → penyakit",
                ),
                Workflow::new(
                    "diagnostic_procedures",
                    "Laboratory and radiology examinations",
                    &["reg_periksa", "periksa_lab", "periksa_radiologi"],
                    "reg_periksa → periksa_lab/periksa_radiologi",
                ),
                Workflow::new(
                    "surgical_procedures",
                    "Surgical operations and procedures",
                    &["reg_periksa", "operasi", "dokter"],
                    "reg_periksa → operasi (multiple doctor roles)",
                ),
                Workflow::new(
                    "medication_management",
                    "Prescription and medication dispensing",
                    &["reg_periksa", "resep_dokter", "obat_racikan"],
                    "reg_periksa → resep_dokter → obat_racikan",
                ),
                Workflow::new(
                    "billing_process",
                    "Patient billing and insurance processing",
                    &["reg_periksa", "nota_jalan", "nota_inap", "bridging_sep"],
                    "reg_periksa → nota_jalan/nota_inap → bridging_sep",
                ),
            ],
            ..Self::default()
        }
    }

    /// Look up a built-in profile by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" | "generic" => Some(Self::default()),
            "hospital" | "healthcare" => Some(Self::hospital()),
            _ => None,
        }
    }

    /// Graph options derived from this profile
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions { anchor_tables: self.anchor_tables.clone() }
    }

    /// Category by name
    pub fn category(&self, name: &str) -> Option<&KeywordCategory> {
        self.keyword_categories.iter().find(|c| c.name == name)
    }

    /// Workflows that touch any of the given tables
    pub fn workflows_for<'a, S: AsRef<str>>(&'a self, tables: &'a [S]) -> impl Iterator<Item = &'a Workflow> {
        self.workflows.iter().filter(move |w| w.involves(tables))
    }

    /// Query suggestions for a table, one per workflow that includes it
    pub fn suggest_related_queries(&self, table: &str) -> Vec<RelatedQuery> {
        self.workflows_for(&[table])
            .map(|w| RelatedQuery {
                workflow: w.name.clone(),
                description: w.description.clone(),
                suggested_query: format!(
                    "Analyze {} involving {table}",
                    w.description.to_lowercase()
                ),
                related_tables: w.tables.join(", "),
            })
            .collect()
    }

    /// Whether a column name is configured as sensitive
    pub fn is_sensitive(&self, column: &str) -> bool {
        self.sensitive_columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

fn default_categories() -> Vec<KeywordCategory> {
    vec![
        KeywordCategory::new(
            "user",
            &["user", "customer", "member", "account", "client"],
            &["user", "customer", "member", "account", "client"],
        ),
        KeywordCategory::new(
            "product",
            &["product", "item", "catalog", "inventory", "stock"],
            &["product", "item", "catalog", "inventory"],
        ),
        KeywordCategory::new(
            "transaction",
            &["sale", "order", "transaction", "payment", "purchase", "revenue", "invoice"],
            &["sale", "order", "transaction", "payment", "purchase", "invoice"],
        ),
        KeywordCategory::new(
            "project",
            &["project", "task", "milestone"],
            &["project", "task", "milestone"],
        ),
        KeywordCategory::new(
            "patient",
            &["patient", "pasien"],
            &["patient", "pasien"],
        ),
        KeywordCategory::new(
            "doctor",
            &["doctor", "physician", "dokter"],
            &["doctor", "dokter"],
        ),
        KeywordCategory::new(
            "visit",
            &["visit", "appointment", "registration", "admission", "periksa"],
            &["visit", "appointment", "reg_periksa", "registration"],
        ),
        KeywordCategory::new(
            "diagnosis",
            &["diagnos", "disease", "penyakit"],
            &["diagnos", "penyakit", "disease"],
        ),
        KeywordCategory::new(
            "medication",
            &["medication", "medicine", "drug", "prescription", "obat", "resep"],
            &["medic", "drug", "prescription", "obat", "resep"],
        ),
    ]
}
