//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Querywise.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `SchemaUnavailable`: Schema introspection failed (fatal for a request)
//! - `DraftingFailed`: The SQL drafting oracle timed out or produced nothing usable
//! - `SafetyRejected`: The safety gate refused the statement (always before execution)
//! - `ExecutionError`: The database driver reported an error while running the query
//! - `ConnectionFailed`: Database connection errors
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `ConfigError`: Configuration file or connection registry errors
//! - `GuidanceFailed`: Best-effort guidance could not be produced (never surfaced as fatal)
//!
//! Validation findings are not errors. A `critical` finding is advisory and travels in
//! the response metadata; only the safety gate can stop execution.

use thiserror::Error;

/// Main error type for Querywise operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Schema introspection failed
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// SQL drafting oracle failed (timeout, transport error, empty output)
    #[error("SQL drafting failed: {0}")]
    DraftingFailed(String),

    /// Statement rejected by the safety gate
    #[error("Safety gate rejected query: {0}")]
    SafetyRejected(String),

    /// Query execution failed in the database
    #[error("Query execution failed: {0}")]
    ExecutionError(String),

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Guidance generation failed
    #[error("Guidance generation failed: {0}")]
    GuidanceFailed(String),
}

impl QueryError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by callers.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaUnavailable(_) => "SCHEMA_UNAVAILABLE",
            Self::DraftingFailed(_) => "DRAFTING_FAILED",
            Self::SafetyRejected(_) => "SAFETY_REJECTED",
            Self::ExecutionError(_) => "EXECUTION_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::GuidanceFailed(_) => "GUIDANCE_FAILED",
        }
    }

    /// Get human-readable error message (no credentials or connection strings)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a schema unavailable error
    pub fn schema_unavailable(message: impl Into<String>) -> Self {
        Self::SchemaUnavailable(message.into())
    }

    /// Create a drafting failed error
    pub fn drafting_failed(message: impl Into<String>) -> Self {
        Self::DraftingFailed(message.into())
    }

    /// Create a safety rejection
    pub fn safety_rejected(message: impl Into<String>) -> Self {
        Self::SafetyRejected(message.into())
    }

    /// Create an execution error
    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::ExecutionError(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a guidance failure
    pub fn guidance_failed(message: impl Into<String>) -> Self {
        Self::GuidanceFailed(message.into())
    }
}

/// Result type alias for Querywise operations
pub type Result<T> = std::result::Result<T, QueryError>;
