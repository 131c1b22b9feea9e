//! MCP (Model Context Protocol) Server
//!
//! Manual JSON-RPC 2.0 over stdio, one request per line.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **State**: one [`QueryIntelligence`] for the process, so the schema cache is shared
//!   by every tool call
//! - **Schemas**: tool input schemas are derived with `schemars`
//!
//! # MCP Tools
//!
//! - `answer_database_question` - answer a natural-language question
//! - `execute_sql` - run caller-written read-only SQL through the safety gate
//! - `describe_schema` - schema context, or one table with its relationships
//! - `validate_sql` - validation findings and auto-correction for caller SQL
//! - `plan_question` - classify a question without drafting SQL
//!
//! # Usage
//!
//! Start the MCP server with: `querywise mcp`
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "querywise": {
//!       "command": "querywise",
//!       "args": ["mcp"]
//!     }
//!   }
//! }
//! ```

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::intelligence::{summarize, QueryIntelligence};

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(JsonRpcError { code, message }) }
    }
}

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    fn json(data: impl Serialize, is_error: bool) -> Result<Value> {
        let text = serde_json::to_string_pretty(&data)?;
        let result = Self {
            content: vec![TextContent { content_type: "text".to_string(), text }],
            is_error,
        };
        Ok(serde_json::to_value(result)?)
    }
}

/// Arguments of `answer_database_question`
#[derive(Debug, Deserialize, JsonSchema)]
struct AnswerArgs {
    /// Natural-language question about the data
    question: String,

    /// Optional caller context (filters, user role, and so on) passed to the SQL drafter
    #[serde(default)]
    user_context: Option<Value>,
}

/// Arguments of `execute_sql`
#[derive(Debug, Deserialize, JsonSchema)]
struct ExecuteArgs {
    /// Read-only SQL (SELECT, SHOW, DESCRIBE, DESC, EXPLAIN)
    sql: String,
}

/// Arguments of `describe_schema`
#[derive(Debug, Default, Deserialize, JsonSchema)]
struct DescribeArgs {
    /// Table to describe; omit for the full schema context
    #[serde(default)]
    table: Option<String>,
}

/// Arguments of `validate_sql`
#[derive(Debug, Deserialize, JsonSchema)]
struct ValidateArgs {
    /// SQL to validate; it is not executed
    sql: String,

    /// Question the SQL is meant to answer, used by the business-rule checks
    #[serde(default)]
    question: Option<String>,
}

/// Arguments of `plan_question`
#[derive(Debug, Deserialize, JsonSchema)]
struct PlanArgs {
    /// Natural-language question to classify
    question: String,
}

/// Tool dispatcher over one shared service
pub struct McpServer {
    intelligence: Arc<QueryIntelligence>,
}

impl McpServer {
    pub fn new(intelligence: Arc<QueryIntelligence>) -> Self {
        Self { intelligence }
    }

    /// Serve requests from stdin until EOF
    ///
    /// # Errors
    /// Returns an error if stdio communication fails.
    #[allow(clippy::future_not_send)]
    pub async fn serve(&self) -> Result<()> {
        let stdin = io::stdin();
        let reader = stdin.lock();
        let mut stdout = io::stdout();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    /// Handle one request line; notifications produce no response
    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => return Some(JsonRpcResponse::error(None, -32700, format!("Parse error: {e}"))),
        };

        if request.id.is_none() && request.method.starts_with("notifications/") {
            tracing::debug!(method = %request.method, "notification");
            return None;
        }

        let result = match request.method.as_str() {
            "initialize" => Ok(initialize()),
            "tools/list" => list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            _ => {
                return Some(JsonRpcResponse::error(
                    request.id,
                    -32601,
                    format!("Unknown method: {}", request.method),
                ))
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::result(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, -32603, e.to_string()),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| anyhow!("Missing params"))?;
        let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Object(Default::default()));
        tracing::info!(tool = name, "tool call");

        match name {
            "answer_database_question" => {
                let args: AnswerArgs = serde_json::from_value(arguments)?;
                let response =
                    self.intelligence.answer_question(&args.question, args.user_context.as_ref()).await;
                let failed = !response.success;
                CallToolResult::json(response, failed)
            }
            "execute_sql" => {
                let args: ExecuteArgs = serde_json::from_value(arguments)?;
                match self.intelligence.execute_sql(&args.sql).await {
                    Ok(result) => CallToolResult::json(
                        serde_json::json!({
                            "success": true,
                            "sql_query": args.sql,
                            "formatted_response": summarize(&result),
                            "data": result,
                        }),
                        false,
                    ),
                    Err(e) => CallToolResult::json(
                        serde_json::json!({
                            "success": false,
                            "sql_query": args.sql,
                            "error": {"code": e.error_code(), "message": e.message()},
                        }),
                        true,
                    ),
                }
            }
            "describe_schema" => {
                let args: DescribeArgs = serde_json::from_value(arguments)?;
                let description = self.intelligence.describe_schema(args.table.as_deref()).await?;
                CallToolResult::json(description, false)
            }
            "validate_sql" => {
                let args: ValidateArgs = serde_json::from_value(arguments)?;
                let question = args.question.unwrap_or_default();
                let review = self.intelligence.review_sql(&args.sql, &question).await?;
                CallToolResult::json(review, false)
            }
            "plan_question" => {
                let args: PlanArgs = serde_json::from_value(arguments)?;
                let plan = self.intelligence.plan(&args.question).await?;
                CallToolResult::json(plan, false)
            }
            _ => Err(anyhow!("Unknown tool: {name}")),
        }
    }
}

fn initialize() -> Value {
    serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "querywise",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn input_schema<T: JsonSchema>() -> Result<Value> {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))?;
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    Ok(schema)
}

fn list_tools() -> Result<Value> {
    Ok(serde_json::json!({
        "tools": [
            {
                "name": "answer_database_question",
                "description": "Answer a natural-language question about the connected database. The question is planned against the live schema, drafted into SQL, validated and auto-corrected, checked by a read-only safety gate, and executed. Returns the SQL, rows, a short text summary, and metadata (tables accessed, complexity, validation findings). On failure returns the error, the pipeline stage reached, and guidance: available tables, name suggestions, and example questions.",
                "inputSchema": input_schema::<AnswerArgs>()?
            },
            {
                "name": "execute_sql",
                "description": "Execute caller-written READ-ONLY SQL. Statements must start with SELECT, SHOW, DESCRIBE, DESC or EXPLAIN; write, DDL, and multi-statement input is rejected with SAFETY_REJECTED before reaching the database.",
                "inputSchema": input_schema::<ExecuteArgs>()?
            },
            {
                "name": "describe_schema",
                "description": "Describe the database schema. Without 'table', returns table names and the rendered schema context (columns, key roles, row counts, sample rows, inferred relationships, join patterns). With 'table', returns that table's columns, relationships, related tables, and suggested domain queries.",
                "inputSchema": input_schema::<DescribeArgs>()?
            },
            {
                "name": "validate_sql",
                "description": "Validate SQL without executing it. Runs syntax, schema, business-rule, performance and security checks, reports complexity, and returns the single auto-correction the self-corrector would apply (for example adding a LIMIT).",
                "inputSchema": input_schema::<ValidateArgs>()?
            },
            {
                "name": "plan_question",
                "description": "Classify a question without drafting SQL: whether it needs several tables, expected complexity, mentioned and suggested tables, and the rules that fired.",
                "inputSchema": input_schema::<PlanArgs>()?
            }
        ]
    }))
}
