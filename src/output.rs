//! JSON Output Types
//!
//! Every command writes exactly one JSON document to stdout.
//!
//! # Output Contract
//! - Answers: `{"success": true, "question": "...", "sql_query": "...", "data": {...},
//!   "formatted_response": "...", "metadata": {...}}`, or on failure
//!   `{"success": false, "question": "...", "error": {...}, "failed_stage": "...", "guidance": {...}}`
//! - Other commands: `{"ok": true, "engine": "...", "command": "...", "data": {...}, "meta": {...}}`
//!   or `{"ok": false, "engine": "...", "command": "...", "error": {"code": "...", "message": "..."}}`

use serde::{Deserialize, Serialize};

use crate::engine::QueryResult;
use crate::error::QueryError;
use crate::intelligence::{Guidance, PipelineStage, QueryType};
use crate::planner::Complexity;
use crate::validation::ValidationResult;

/// Success envelope for non-answer commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine (mysql, sqlite)
    pub engine: String,

    /// Command that was executed (schema, plan, validate, execute)
    pub command: String,

    pub data: T,
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, engine: engine.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for non-answer commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Database engine, empty when the failure happened before connecting
    pub engine: String,

    pub command: String,
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, engine: engine.into(), command: command.into(), error }
    }

    pub fn from_error(engine: impl Into<String>, command: impl Into<String>, err: &QueryError) -> Self {
        Self::new(engine, command, ErrorInfo::from(err))
    }
}

/// Error information structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "SAFETY_REJECTED", "DRAFTING_FAILED")
    pub code: String,

    /// Human-readable message (no credentials or connection strings)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

impl From<&QueryError> for ErrorInfo {
    fn from(err: &QueryError) -> Self {
        Self::new(err.error_code(), err.message())
    }
}

/// Envelope metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub execution_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None }
    }

    pub fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned) }
    }
}

/// Metadata of a successful answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub request_id: String,
    pub rows_returned: usize,
    pub tables_accessed: Vec<String>,
    pub query_type: QueryType,
    pub complexity: Complexity,
    pub requires_multiple_tables: bool,

    /// Whether the schema came from the cache
    pub cache_hit: bool,

    /// Context strategy (semantic, relationship_graph, schema_only)
    pub context_provider: String,

    /// Statement as drafted, before self-correction
    pub drafted_sql: String,

    pub corrected: bool,

    /// Findings for the executed statement
    pub validation: Vec<ValidationResult>,

    /// A critical finding remained after self-correction
    pub unresolved_critical: bool,

    pub execution_ms: u64,
    pub total_ms: u64,
}

/// Answer to one natural-language question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub success: bool,
    pub question: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_response: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnswerMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    /// Last pipeline stage reached before the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<Guidance>,
}

impl AnswerResponse {
    pub fn success(
        question: impl Into<String>,
        sql: impl Into<String>,
        data: QueryResult,
        formatted: impl Into<String>,
        metadata: AnswerMetadata,
    ) -> Self {
        Self {
            success: true,
            question: question.into(),
            sql_query: Some(sql.into()),
            data: Some(data),
            formatted_response: Some(formatted.into()),
            metadata: Some(metadata),
            error: None,
            failed_stage: None,
            guidance: None,
        }
    }

    pub fn failure(
        question: impl Into<String>,
        err: &QueryError,
        stage: PipelineStage,
        guidance: Guidance,
    ) -> Self {
        Self {
            success: false,
            question: question.into(),
            sql_query: None,
            data: None,
            formatted_response: None,
            metadata: None,
            error: Some(ErrorInfo::from(err)),
            failed_stage: Some(stage),
            guidance: Some(guidance),
        }
    }

    /// Attach the statement that was being processed when the request failed
    #[must_use]
    pub fn with_sql(mut self, sql: Option<String>) -> Self {
        self.sql_query = sql;
        self
    }
}
