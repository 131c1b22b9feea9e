//! Querywise CLI Entry Point
//!
//! Subcommands:
//! - `ask` - Answer a natural-language question against the database
//! - `schema` - Show the schema context, or one table's relationships
//! - `plan` - Classify a question without drafting SQL
//! - `validate` - Validate and auto-correct SQL without executing it
//! - `execute` - Run read-only SQL through the safety gate
//! - `mcp` - MCP server mode (hidden, for AI agent integration)
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use querywise::config::{self, Settings};
use querywise::engine::ConnectionConfig;
use querywise::intelligence::{summarize, QueryIntelligence};
use querywise::mcp::McpServer;
use querywise::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use querywise::{QueryError, Result};

/// Querywise - schema-aware natural-language questions over SQL databases
#[derive(Parser)]
#[command(name = "querywise")]
#[command(about = "Answer natural-language questions with validated, read-only SQL")]
#[command(version)]
struct Cli {
    /// Config file to use instead of the local and global config files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named connection from the config file
    #[arg(long, global = true, conflicts_with = "file")]
    connection: Option<String>,

    /// SQLite database file (ad-hoc connection, bypasses configured connections)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a natural-language question
    Ask {
        question: String,

        /// Extra caller context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },

    /// Show the schema context
    Schema {
        /// Describe one table and its relationships
        #[arg(long)]
        table: Option<String>,
    },

    /// Classify a question without drafting SQL
    Plan { question: String },

    /// Validate and auto-correct SQL without executing it
    Validate {
        sql: String,

        /// Question the SQL is meant to answer (enables business checks)
        #[arg(long, default_value = "")]
        question: String,
    },

    /// Execute read-only SQL
    Execute { sql: String },

    /// Start MCP server (hidden from help, for AI agent integration)
    #[command(hide = true)]
    Mcp,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Ask { .. } => "ask",
            Self::Schema { .. } => "schema",
            Self::Plan { .. } => "plan",
            Self::Validate { .. } => "validate",
            Self::Execute { .. } => "execute",
            Self::Mcp => "mcp",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("querywise=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.name();

    let (settings, connection) = match resolve(&cli) {
        Ok(resolved) => resolved,
        Err(e) => return fail("", command, &e),
    };
    let engine = connection.engine.to_string();

    let intelligence = match QueryIntelligence::from_settings(&settings, &connection) {
        Ok(service) => Arc::new(service),
        Err(e) => return fail(&engine, command, &e),
    };

    match cli.command {
        Commands::Ask { question, context } => {
            let context: Option<serde_json::Value> =
                match context.as_deref().map(serde_json::from_str).transpose() {
                    Ok(context) => context,
                    Err(e) => {
                        let err = QueryError::invalid_input(format!("--context is not valid JSON: {e}"));
                        return fail(&engine, command, &err);
                    }
                };
            let response = intelligence.answer_question(&question, context.as_ref()).await;
            let code = if response.success { ExitCode::SUCCESS } else { ExitCode::FAILURE };
            print_json(&response);
            code
        }
        Commands::Schema { table } => {
            let started = Instant::now();
            let outcome = intelligence.describe_schema(table.as_deref()).await;
            report(&engine, command, started, outcome.map(|data| (data, None)))
        }
        Commands::Plan { question } => {
            let started = Instant::now();
            let outcome = intelligence.plan(&question).await;
            report(&engine, command, started, outcome.map(|plan| (plan, None)))
        }
        Commands::Validate { sql, question } => {
            let started = Instant::now();
            let outcome = intelligence.review_sql(&sql, &question).await;
            report(&engine, command, started, outcome.map(|review| (review, None)))
        }
        Commands::Execute { sql } => {
            let started = Instant::now();
            let outcome = intelligence.execute_sql(&sql).await.map(|result| {
                let rows = result.rows.len();
                let data = serde_json::json!({
                    "formatted_response": summarize(&result),
                    "result": result,
                });
                (data, Some(rows))
            });
            report(&engine, command, started, outcome)
        }
        Commands::Mcp => match McpServer::new(intelligence).serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "MCP server stopped");
                ExitCode::FAILURE
            }
        },
    }
}

fn resolve(cli: &Cli) -> Result<(Settings, ConnectionConfig)> {
    let settings = match &cli.config {
        Some(path) => config::load_settings_from(path)?,
        None => config::load_settings()?,
    };
    let connection = match &cli.file {
        Some(file) => ConnectionConfig::sqlite(file.clone()),
        None => settings.resolve_connection(cli.connection.as_deref())?,
    };
    Ok((settings, connection))
}

fn report<T: Serialize>(
    engine: &str,
    command: &str,
    started: Instant,
    outcome: Result<(T, Option<usize>)>,
) -> ExitCode {
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match outcome {
        Ok((data, rows)) => {
            let meta = match rows {
                Some(rows) => Metadata::with_rows(elapsed, rows),
                None => Metadata::new(elapsed),
            };
            print_json(&SuccessEnvelope::new(engine, command, data, meta));
            ExitCode::SUCCESS
        }
        Err(e) => fail(engine, command, &e),
    }
}

fn fail(engine: &str, command: &str, err: &QueryError) -> ExitCode {
    tracing::warn!(command, code = err.error_code(), error = %err, "command failed");
    print_json(&ErrorEnvelope::from_error(engine, command, err));
    ExitCode::FAILURE
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            let fallback = ErrorEnvelope::from_error("", "output", &QueryError::invalid_input(e.to_string()));
            println!("{}", serde_json::to_string(&fallback).unwrap_or_default());
        }
    }
}
