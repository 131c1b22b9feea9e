//! Query Intelligence
//!
//! Answers natural-language questions end to end:
//!
//! ```text
//! Received → SchemaReady → Planned → Drafted → Corrected → Gated → Executed → Formatted
//! ```
//!
//! Any stage may fail. A failure becomes an [`AnswerResponse`] carrying the error, the
//! last stage reached, and best-effort [`Guidance`]; it is never propagated as an error.
//!
//! Validation findings are advisory. A critical finding that self-correction could not
//! resolve is reported in the metadata (`unresolved_critical`) and does not stop the
//! pipeline. Only the safety gate blocks execution.

mod format;
mod guidance;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::engine::{self, ColumnInfo, ConnectionConfig, QueryResult};
use crate::error::{QueryError, Result};
use crate::oracle::{
    build_prompt, clean_sql_response, draft_timeout, OllamaOracle, SqlDraftingOracle,
};
use crate::output::{AnswerMetadata, AnswerResponse};
use crate::graph::RelationshipEdge;
use crate::planner::{QueryPlan, QueryPlanner};
use crate::profile::RelatedQuery;
use crate::retriever::{ContextProvider, KnowledgeRetriever};
use crate::safety::assert_safe;
use crate::schema::{SchemaCache, SystemClock};
use crate::validation::{
    extract_tables, has_critical, Correction, QueryComplexity, QueryValidator, SelfCorrector,
    ValidationResult, ValidationSettings,
};

pub use format::{classify_query_type, summarize, QueryType, MAX_SUMMARY_RECORDS, NO_DATA};
pub use guidance::{build_guidance, example_questions, Guidance, TableGuidance};

/// Pipeline state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    SchemaReady,
    Planned,
    Drafted,
    Corrected,
    Gated,
    Executed,
    Formatted,
    Failed,
}

impl PipelineStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::SchemaReady => "schema_ready",
            Self::Planned => "planned",
            Self::Drafted => "drafted",
            Self::Corrected => "corrected",
            Self::Gated => "gated",
            Self::Executed => "executed",
            Self::Formatted => "formatted",
            Self::Failed => "failed",
        }
    }
}

/// Validation report for a statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlReview {
    pub findings: Vec<ValidationResult>,
    pub complexity: QueryComplexity,
    pub improvements: Vec<String>,
    pub correction: Correction,

    /// Whether the read-only gate would accept the statement
    pub safe: bool,
}

/// Schema overview, or one table in detail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaDescription {
    Database {
        database: String,
        hash: String,
        tables: Vec<String>,
        relationships: Vec<RelationshipEdge>,
        context: String,
        cache_hit: bool,
    },
    Table {
        table: String,
        columns: Vec<ColumnInfo>,
        row_count: Option<u64>,
        relationships: Vec<RelationshipEdge>,
        related_tables: Vec<String>,
        related_queries: Vec<RelatedQuery>,
    },
}

/// Per-request progress, owned by one pipeline run
struct PipelineRun {
    request_id: String,
    stage: PipelineStage,
    sql: Option<String>,
}

impl PipelineRun {
    fn new() -> Self {
        Self { request_id: Uuid::new_v4().to_string(), stage: PipelineStage::Received, sql: None }
    }

    fn advance(&mut self, stage: PipelineStage) {
        self.stage = stage;
        info!(request_id = %self.request_id, stage = stage.as_str(), "pipeline stage");
    }
}

/// Question-answering service over one database
///
/// Shared across concurrent requests behind an `Arc`; requests share only the schema
/// cache.
pub struct QueryIntelligence {
    cache: Arc<SchemaCache>,
    oracle: Arc<dyn SqlDraftingOracle>,
    planner: QueryPlanner,
    provider: ContextProvider,
    validation: ValidationSettings,
    prompt_template: Option<String>,
}

impl QueryIntelligence {
    pub fn new(cache: Arc<SchemaCache>, oracle: Arc<dyn SqlDraftingOracle>) -> Self {
        let planner = QueryPlanner::new(cache.profile().clone());
        Self {
            cache,
            oracle,
            planner,
            provider: ContextProvider::RelationshipGraph,
            validation: ValidationSettings::default(),
            prompt_template: None,
        }
    }

    /// Wire a service for one connection: engine gateway, schema cache, Ollama oracle
    ///
    /// # Errors
    /// * `ConnectionFailed` / `InvalidInput` if the gateway cannot be opened
    /// * `DraftingFailed` if the HTTP client cannot be built
    pub fn from_settings(settings: &Settings, connection: &ConnectionConfig) -> Result<Self> {
        let gateway = engine::connect(connection, settings.limits)?;
        let cache = SchemaCache::new(
            gateway,
            settings.profile.clone(),
            settings.cache,
            Arc::new(SystemClock),
        );
        let oracle = OllamaOracle::new(settings.oracle.clone())?;

        Ok(Self::new(Arc::new(cache), Arc::new(oracle))
            .with_validation(settings.validation.clone())
            .with_prompt_template(settings.oracle.prompt_template.clone()))
    }

    /// Use semantic retrieval for context
    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.provider = ContextProvider::select(Some(retriever), true);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: ContextProvider) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, settings: ValidationSettings) -> Self {
        self.validation = settings;
        self
    }

    #[must_use]
    pub fn with_prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn provider(&self) -> &ContextProvider {
        &self.provider
    }

    /// Answer a question; failures are returned as a failed response
    pub async fn answer_question(
        &self,
        question: &str,
        user_context: Option<&serde_json::Value>,
    ) -> AnswerResponse {
        let mut run = PipelineRun::new();
        info!(request_id = %run.request_id, question, "processing database question");

        match self.run_pipeline(question, user_context, &mut run).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    request_id = %run.request_id,
                    stage = run.stage.as_str(),
                    code = err.error_code(),
                    error = %err,
                    "question failed"
                );
                let guidance = self.guidance_for(&err).await;
                AnswerResponse::failure(question, &err, run.stage, guidance).with_sql(run.sql)
            }
        }
    }

    /// Classify a question against the current schema
    ///
    /// # Errors
    /// * `SchemaUnavailable` if the schema cannot be loaded
    pub async fn plan(&self, question: &str) -> Result<QueryPlan> {
        let schema = self.cache.schema_context().await?;
        Ok(self.planner.classify(question, &schema.snapshot))
    }

    /// Run caller-supplied SQL through the safety gate and execute it
    ///
    /// # Errors
    /// * `SafetyRejected` if the gate refuses the statement
    /// * `ExecutionError` if the database rejects it
    pub async fn execute_sql(&self, sql: &str) -> Result<QueryResult> {
        assert_safe(sql)?;
        self.cache.gateway().execute(sql).await
    }

    /// Describe the schema, or one table when `table` is given
    ///
    /// # Errors
    /// * `SchemaUnavailable` if the schema cannot be loaded
    /// * `InvalidInput` if the table does not exist
    pub async fn describe_schema(&self, table: Option<&str>) -> Result<SchemaDescription> {
        let schema = self.cache.schema_context().await?;
        let snapshot = &schema.snapshot;

        let Some(table) = table else {
            return Ok(SchemaDescription::Database {
                database: snapshot.database.clone(),
                hash: snapshot.hash.clone(),
                tables: snapshot.table_names().into_iter().map(String::from).collect(),
                relationships: snapshot.graph.edges().to_vec(),
                context: snapshot.context.clone(),
                cache_hit: schema.cache_hit,
            });
        };

        let details = snapshot.graph.table(table).ok_or_else(|| {
            QueryError::invalid_input(format!(
                "Table '{table}' not found. Available: {}",
                snapshot.table_names().join(", ")
            ))
        })?;
        let name = details.name();

        Ok(SchemaDescription::Table {
            table: name.to_string(),
            columns: details.columns().to_vec(),
            row_count: details.row_count(),
            relationships: snapshot.graph.edges_for(name).cloned().collect(),
            related_tables: snapshot.graph.related_tables(name, 2),
            related_queries: self.cache.profile().suggest_related_queries(name),
        })
    }

    /// Validate caller SQL against the current schema without executing it
    ///
    /// # Errors
    /// * `SchemaUnavailable` if the schema cannot be loaded
    pub async fn review_sql(&self, sql: &str, question: &str) -> Result<SqlReview> {
        let schema = self.cache.schema_context().await?;
        let tables = schema.snapshot.table_names();
        let validator = QueryValidator::new(&tables, self.cache.profile(), self.validation.clone());
        let corrector = SelfCorrector::new(validator);

        Ok(SqlReview {
            findings: corrector.validator().validate(sql, question),
            complexity: corrector.validator().analyze_complexity(sql),
            improvements: corrector.suggest_improvements(sql, question),
            correction: corrector.auto_correct(sql, question),
            safe: crate::safety::is_safe(sql),
        })
    }

    async fn run_pipeline(
        &self,
        question: &str,
        user_context: Option<&serde_json::Value>,
        run: &mut PipelineRun,
    ) -> Result<AnswerResponse> {
        let started = Instant::now();
        if question.trim().is_empty() {
            return Err(QueryError::invalid_input("Question cannot be empty"));
        }

        let schema = self.cache.schema_context().await?;
        let snapshot = Arc::clone(&schema.snapshot);
        run.advance(PipelineStage::SchemaReady);

        let plan = self.planner.classify(question, &snapshot);
        info!(
            request_id = %run.request_id,
            complexity = plan.complexity.as_str(),
            multi_table = plan.requires_multiple_tables,
            "question planned"
        );
        run.advance(PipelineStage::Planned);

        let context = self.provider.build(question, &plan, &self.cache, &snapshot).await;
        let prompt = build_prompt(
            self.prompt_template.as_deref(),
            &context,
            &question_with_context(question, user_context),
        );
        let drafted = self.draft(&prompt).await?;
        run.sql = Some(drafted.clone());
        run.advance(PipelineStage::Drafted);

        let correction = {
            let tables = snapshot.table_names();
            let validator = QueryValidator::new(&tables, self.cache.profile(), self.validation.clone());
            SelfCorrector::new(validator).auto_correct(&drafted, question)
        };
        let unresolved_critical = has_critical(&correction.results);
        if unresolved_critical {
            warn!(request_id = %run.request_id, sql = %correction.sql, "critical validation finding left unresolved");
        }
        let sql = correction.sql.clone();
        run.sql = Some(sql.clone());
        run.advance(PipelineStage::Corrected);

        assert_safe(&sql)?;
        run.advance(PipelineStage::Gated);

        let executed_at = Instant::now();
        let result = self.cache.gateway().execute(&sql).await?;
        let execution_ms = elapsed_ms(executed_at);
        run.advance(PipelineStage::Executed);

        let formatted = summarize(&result);
        let metadata = AnswerMetadata {
            request_id: run.request_id.clone(),
            rows_returned: result.rows.len(),
            tables_accessed: extract_tables(&sql),
            query_type: classify_query_type(&sql),
            complexity: plan.complexity,
            requires_multiple_tables: plan.requires_multiple_tables,
            cache_hit: schema.cache_hit,
            context_provider: self.provider.kind().to_string(),
            drafted_sql: drafted,
            corrected: correction.corrected(),
            validation: correction.results,
            unresolved_critical,
            execution_ms,
            total_ms: elapsed_ms(started),
        };
        run.advance(PipelineStage::Formatted);

        Ok(AnswerResponse::success(question, sql, result, formatted, metadata))
    }

    async fn draft(&self, prompt: &str) -> Result<String> {
        let timeout = draft_timeout(prompt.len());
        let raw = tokio::time::timeout(timeout, self.oracle.draft(prompt))
            .await
            .map_err(|_| {
                QueryError::drafting_failed(format!(
                    "{} did not answer within {}s",
                    self.oracle.name(),
                    timeout.as_secs()
                ))
            })??;

        let sql = clean_sql_response(&raw);
        if sql.is_empty() {
            return Err(QueryError::drafting_failed("Oracle returned no SQL"));
        }
        Ok(sql)
    }

    async fn guidance_for(&self, err: &QueryError) -> Guidance {
        let snapshot = match self.cache.current() {
            Some(snapshot) => Some(snapshot),
            None if matches!(err, QueryError::SchemaUnavailable(_) | QueryError::ConnectionFailed(_)) => None,
            None => match self.cache.schema_context().await {
                Ok(schema) => Some(schema.snapshot),
                Err(e) => {
                    warn!(error = %e, "guidance built without schema");
                    return build_guidance(err, None)
                        .degraded_by(&QueryError::guidance_failed(e.message()));
                }
            },
        };
        build_guidance(err, snapshot.as_deref())
    }
}

/// Question text for the prompt, with caller context appended when present
fn question_with_context(question: &str, user_context: Option<&serde_json::Value>) -> String {
    match user_context {
        Some(context) if !context.is_null() && context != &serde_json::json!({}) => {
            format!("{question}\nADDITIONAL CONTEXT: {context}")
        }
        _ => question.to_string(),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stub::StubGateway;
    use crate::profile::DomainProfile;
    use crate::schema::{CacheSettings, SystemClock};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct ScriptedOracle {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply.to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self { reply: Err(message.to_string()), prompts: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl SqlDraftingOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn draft(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            self.reply.clone().map_err(QueryError::drafting_failed)
        }
    }

    fn gateway() -> Arc<StubGateway> {
        Arc::new(
            StubGateway::new()
                .with_table("users", &["id", "name"])
                .with_table("sales", &["id", "user_id", "amount"]),
        )
    }

    fn service(gateway: Arc<StubGateway>, oracle: Arc<ScriptedOracle>) -> QueryIntelligence {
        let cache = SchemaCache::new(
            gateway,
            DomainProfile::default(),
            CacheSettings::default(),
            Arc::new(SystemClock),
        );
        QueryIntelligence::new(Arc::new(cache), oracle)
    }

    #[tokio::test]
    async fn test_answer_count_question() {
        let gateway = gateway();
        gateway.set_result(Ok(QueryResult {
            columns: vec!["COUNT(*)".into()],
            rows: vec![vec![json!(2)]],
            rows_affected: None,
        }));
        let oracle = ScriptedOracle::replying("```sql\nSELECT COUNT(*) FROM users;\n```");
        let service = service(Arc::clone(&gateway), Arc::clone(&oracle));

        let response = service.answer_question("how many users?", None).await;

        assert!(response.success, "{response:?}");
        assert_eq!(response.sql_query.as_deref(), Some("SELECT COUNT(*) FROM users LIMIT 100"));
        assert_eq!(
            response.formatted_response.as_deref(),
            Some("Found 1 record(s):\n\nRecord 1: COUNT(*): 2")
        );
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.rows_returned, 1);
        assert_eq!(metadata.tables_accessed, vec!["users"]);
        assert_eq!(metadata.query_type, QueryType::Count);
        assert!(!metadata.requires_multiple_tables);
        assert!(metadata.corrected);
        assert!(!metadata.unresolved_critical);
        assert_eq!(metadata.drafted_sql, "SELECT COUNT(*) FROM users");

        assert_eq!(gateway.executed.lock().as_slice(), ["SELECT COUNT(*) FROM users LIMIT 100"]);
        assert!(!oracle.prompts.lock()[0].contains("MULTI-TABLE QUERY GUIDANCE"));
    }

    #[tokio::test]
    async fn test_multi_table_prompt_has_join_path() {
        let oracle = ScriptedOracle::replying(
            "SELECT u.name, SUM(s.amount) FROM users u JOIN sales s ON s.user_id = u.id GROUP BY u.name LIMIT 10",
        );
        let service = service(gateway(), Arc::clone(&oracle));

        let response = service.answer_question("total sales by user", None).await;
        assert!(response.success);
        let metadata = response.metadata.unwrap();
        assert!(metadata.requires_multiple_tables);
        assert_eq!(metadata.tables_accessed, vec!["users", "sales"]);
        assert_eq!(metadata.query_type, QueryType::Aggregation);

        let prompt = oracle.prompts.lock()[0].clone();
        assert!(prompt.contains("=== MULTI-TABLE QUERY GUIDANCE ==="));
        assert!(prompt.contains("JOIN users ON sales.user_id = users.id"));
    }

    #[tokio::test]
    async fn test_unsafe_draft_is_never_executed() {
        let gateway = gateway();
        let oracle = ScriptedOracle::replying("DELETE FROM users");
        let service = service(Arc::clone(&gateway), oracle);

        let response = service.answer_question("remove all users", None).await;
        assert!(!response.success);
        assert_eq!(response.error.as_ref().unwrap().code, "SAFETY_REJECTED");
        assert_eq!(response.failed_stage, Some(PipelineStage::Corrected));
        assert_eq!(response.sql_query.as_deref(), Some("DELETE FROM users"));
        assert!(gateway.executed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_has_guidance() {
        let service = service(gateway(), ScriptedOracle::failing("connection refused"));

        let response = service.answer_question("how many users?", None).await;
        assert!(!response.success);
        assert_eq!(response.error.as_ref().unwrap().code, "DRAFTING_FAILED");
        assert_eq!(response.failed_stage, Some(PipelineStage::Planned));

        let guidance = response.guidance.unwrap();
        let tables: Vec<&str> = guidance.available_tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tables, vec!["users", "sales"]);
        assert!(guidance.example_questions.contains(&"Show me all users".to_string()));
    }

    #[tokio::test]
    async fn test_empty_draft_fails() {
        let service = service(gateway(), ScriptedOracle::replying("<think>no idea</think>"));
        let response = service.answer_question("how many users?", None).await;
        assert_eq!(response.error.unwrap().code, "DRAFTING_FAILED");
    }

    #[tokio::test]
    async fn test_schema_unavailable_fails_first() {
        let gateway = gateway();
        gateway.fail_introspection.store(true, Ordering::SeqCst);
        let service = service(gateway, ScriptedOracle::replying("SELECT 1"));

        let response = service.answer_question("how many users?", None).await;
        assert_eq!(response.error.as_ref().unwrap().code, "SCHEMA_UNAVAILABLE");
        assert_eq!(response.failed_stage, Some(PipelineStage::Received));
        let guidance = response.guidance.unwrap();
        assert!(guidance.available_tables.is_empty());
        assert!(guidance.degraded.is_none());
    }

    #[tokio::test]
    async fn test_guidance_records_schema_failure() {
        let gateway = gateway();
        gateway.fail_introspection.store(true, Ordering::SeqCst);
        let service = service(gateway, ScriptedOracle::replying("SELECT 1"));

        let response = service.answer_question("  ", None).await;
        assert_eq!(response.error.as_ref().unwrap().code, "INVALID_INPUT");

        let guidance = response.guidance.unwrap();
        assert!(guidance.available_tables.is_empty());
        let degraded = guidance.degraded.unwrap();
        assert_eq!(degraded.code, "GUIDANCE_FAILED");
        assert!(degraded.message.contains("stub database is down"));
    }

    #[tokio::test]
    async fn test_execution_error_suggests_columns() {
        let gateway = gateway();
        gateway.set_result(Err("no such column: total".to_string()));
        let service = service(Arc::clone(&gateway), ScriptedOracle::replying("SELECT total FROM sales LIMIT 5"));

        let response = service.answer_question("sales totals", None).await;
        assert_eq!(response.error.as_ref().unwrap().code, "EXECUTION_ERROR");
        assert_eq!(response.failed_stage, Some(PipelineStage::Gated));
        let guidance = response.guidance.unwrap();
        assert!(guidance.suggestions[0].starts_with("Column 'total' does not exist"));
    }

    #[tokio::test]
    async fn test_user_context_reaches_prompt() {
        let oracle = ScriptedOracle::replying("SELECT * FROM users LIMIT 5");
        let service = service(gateway(), Arc::clone(&oracle));
        let context = json!({"region": "west"});

        let response = service.answer_question("list users", Some(&context)).await;
        assert!(response.success);
        assert!(oracle.prompts.lock()[0].contains(r#"ADDITIONAL CONTEXT: {"region":"west"}"#));
    }

    #[tokio::test]
    async fn test_execute_sql_is_gated() {
        let gateway = gateway();
        let service = service(Arc::clone(&gateway), ScriptedOracle::replying("SELECT 1"));

        let err = service.execute_sql("DROP TABLE users").await.unwrap_err();
        assert_eq!(err.error_code(), "SAFETY_REJECTED");
        assert!(service.execute_sql("SELECT * FROM users").await.is_ok());
        assert_eq!(gateway.executed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_review_sql_reports_and_corrects() {
        let service = service(gateway(), ScriptedOracle::replying("SELECT 1"));

        let review = service.review_sql("SELECT * FROM user", "list users").await.unwrap();
        let messages: Vec<&str> = review.findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Table 'user' is not a known table",
                "Query without LIMIT clause may return too many rows",
            ]
        );
        assert_eq!(review.findings[0].suggestion.as_deref(), Some("Did you mean: users?"));
        assert_eq!(review.correction.sql, "SELECT * FROM user LIMIT 100");
        assert_eq!(review.complexity.table_count, 1);
        assert!(review.safe);
        assert!(review.improvements.iter().any(|i| i == "WARNING: Add LIMIT clause to control result set size"));
    }

    #[tokio::test]
    async fn test_describe_schema() {
        let service = service(gateway(), ScriptedOracle::replying("SELECT 1"));

        let SchemaDescription::Database { tables, relationships, cache_hit, .. } =
            service.describe_schema(None).await.unwrap()
        else {
            panic!("expected database description");
        };
        assert_eq!(tables, vec!["users", "sales"]);
        assert_eq!(relationships.len(), 1);
        assert!(!cache_hit);

        let SchemaDescription::Table { table, columns, relationships, .. } =
            service.describe_schema(Some("SALES")).await.unwrap()
        else {
            panic!("expected table description");
        };
        assert_eq!(table, "sales");
        assert_eq!(columns.len(), 3);
        assert_eq!(relationships[0].join_condition(), "sales.user_id = users.id");

        let err = service.describe_schema(Some("orders")).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(err.message().ends_with("Table 'orders' not found. Available: users, sales"));
    }
}
