//! Querywise - Schema-Aware Query Intelligence
//!
//! Querywise answers natural-language questions about a relational database. It
//! introspects the schema, infers how tables relate, decides whether a question needs
//! several tables, asks a SQL drafting oracle for a statement, validates and repairs it,
//! and executes it through a read-only safety gate.
//!
//! # Core Principles
//! - Read-only by construction (every statement passes the safety gate before execution)
//! - Machine-first output (JSON on stdout, logs on stderr)
//! - Validation is advisory; only the safety gate blocks execution
//! - Failures carry guidance instead of bare errors
//!
//! # Architecture
//! The CLI and the MCP server are thin wrappers over [`QueryIntelligence`].
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output types
//! - [`engine`] - Database gateway trait and engine implementations
//! - [`safety`] - Read-only safety gate
//! - [`schema`] - Table model, schema cache and schema context rendering
//! - [`graph`] - Relationship inference and join paths
//! - [`profile`] - Domain tuning (keywords, workflows, join requirements)
//! - [`planner`] - Multi-table query planning
//! - [`validation`] - Staged validation and self-correction
//! - [`oracle`] - SQL drafting oracle and prompt construction
//! - [`retriever`] - Context providers
//! - [`intelligence`] - The question-answering pipeline
//! - [`config`] - Configuration management
//! - [`mcp`] - MCP server

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod intelligence;
pub mod mcp;
pub mod oracle;
pub mod output;
pub mod planner;
pub mod profile;
pub mod retriever;
pub mod safety;
pub mod schema;
pub mod validation;

// Re-export commonly used types for convenience
pub use config::{load_settings, load_settings_from, ConfigFile, Settings, StoredConnection};
pub use engine::{
    connect, ColumnInfo, ConnectionConfig, DatabaseGateway, DatabaseType, ExecutionLimits,
    KeyRole, QueryResult,
};
pub use error::{QueryError, Result};
pub use graph::{EdgeKind, RelationshipEdge, RelationshipGraph};
pub use intelligence::{PipelineStage, QueryIntelligence, SchemaDescription, SqlReview};
pub use oracle::{OllamaOracle, OracleSettings, SqlDraftingOracle};
pub use output::{AnswerMetadata, AnswerResponse, ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use planner::{Complexity, QueryPlan, QueryPlanner};
pub use profile::DomainProfile;
pub use retriever::{ContextProvider, KnowledgeRetriever};
pub use safety::{assert_safe, is_safe};
pub use schema::{CacheSettings, SchemaCache, SchemaSnapshot, TableSchema};
pub use validation::{QueryValidator, SelfCorrector, ValidationLevel, ValidationResult};
