//! End-to-End Pipeline Tests
//!
//! Runs questions through [`QueryIntelligence`] against real `SQLite` files with a
//! scripted drafting oracle. Covers:
//! - Single- and multi-table answers, including the prompt the oracle receives
//! - Self-correction before execution
//! - Failures at each stage, with the stage reached and guidance
//! - Schema cache reuse across questions

#![cfg(feature = "sqlite")]

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use querywise::engine::sqlite::SqliteGateway;
use querywise::schema::SystemClock;
use querywise::{
    CacheSettings, ConnectionConfig, DomainProfile, ExecutionLimits, PipelineStage,
    QueryError, QueryIntelligence, SchemaCache, SqlDraftingOracle,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a `SQLite` database from DDL/DML statements
fn create_db(name: &str, statements: &[&str]) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("querywise_pipeline_{name}_{}_{id}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let conn = rusqlite::Connection::open(&path).expect("Failed to create temp database");
    for statement in statements {
        conn.execute(statement, []).expect("Failed to run setup statement");
    }
    path
}

fn shop_db() -> PathBuf {
    create_db(
        "shop",
        &[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE sales (id INTEGER PRIMARY KEY, user_id INTEGER, amount INTEGER)",
            "INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')",
            "INSERT INTO sales (user_id, amount) VALUES (1, 10), (1, 20), (2, 5)",
        ],
    )
}

fn cleanup(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Oracle that returns a fixed reply and records prompts
struct ScriptedOracle {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn replying(sql: &str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(sql.to_string()), prompts: Mutex::new(Vec::new()) })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { reply: Err(message.to_string()), prompts: Mutex::new(Vec::new()) })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SqlDraftingOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn draft(&self, prompt: &str) -> querywise::Result<String> {
        self.prompts.lock().push(prompt.to_string());
        self.reply.clone().map_err(QueryError::drafting_failed)
    }
}

fn cache_for(path: &Path) -> Arc<SchemaCache> {
    let gateway = SqliteGateway::new(
        ConnectionConfig::sqlite(path.to_path_buf()),
        ExecutionLimits::default(),
    )
    .expect("Failed to open gateway");
    Arc::new(SchemaCache::new(
        Arc::new(gateway),
        DomainProfile::default(),
        CacheSettings::default(),
        Arc::new(SystemClock),
    ))
}

fn service(path: &Path, oracle: Arc<ScriptedOracle>) -> QueryIntelligence {
    QueryIntelligence::new(cache_for(path), oracle)
}

// ============================================================================
// Answers
// ============================================================================

#[tokio::test]
async fn test_count_question_is_corrected_and_answered() {
    let path = shop_db();
    let oracle = ScriptedOracle::replying("<think>count rows</think>\nSELECT COUNT(*) AS n FROM users;");
    let service = service(&path, Arc::clone(&oracle));

    let response = service.answer_question("how many users?", None).await;

    assert!(response.success, "{response:?}");
    assert_eq!(response.sql_query.as_deref(), Some("SELECT COUNT(*) AS n FROM users LIMIT 100"));
    assert_eq!(response.formatted_response.as_deref(), Some("Found 1 record(s):\n\nRecord 1: n: 2"));

    let data = response.data.unwrap();
    assert_eq!(data.columns, vec!["n"]);
    assert_eq!(data.rows, vec![vec![json!(2)]]);

    let metadata = response.metadata.unwrap();
    assert!(metadata.corrected);
    assert!(!metadata.requires_multiple_tables);
    assert_eq!(metadata.drafted_sql, "SELECT COUNT(*) AS n FROM users");
    assert_eq!(metadata.context_provider, "relationship_graph");

    let prompt = oracle.last_prompt();
    assert!(prompt.contains("USER QUESTION: how many users?"));
    assert!(!prompt.contains("MULTI-TABLE QUERY GUIDANCE"));

    cleanup(&path);
}

#[tokio::test]
async fn test_multi_table_question_gets_join_guidance() {
    let path = shop_db();
    let oracle = ScriptedOracle::replying(
        "```sql\nSELECT u.name, SUM(s.amount) AS total\nFROM users u\nJOIN sales s ON s.user_id = u.id\nGROUP BY u.name\nORDER BY u.name\nLIMIT 10\n```",
    );
    let service = service(&path, Arc::clone(&oracle));

    let response = service.answer_question("total sales by user", None).await;

    assert!(response.success, "{response:?}");
    let data = response.data.unwrap();
    assert_eq!(data.rows, vec![vec![json!("Alice"), json!(30)], vec![json!("Bob"), json!(5)]]);

    let metadata = response.metadata.unwrap();
    assert!(metadata.requires_multiple_tables);
    assert!(!metadata.corrected);
    assert_eq!(metadata.tables_accessed, vec!["users", "sales"]);

    let prompt = oracle.last_prompt();
    assert!(prompt.contains("=== MULTI-TABLE QUERY GUIDANCE ==="));
    assert!(prompt.contains("sales.user_id = users.id"));

    cleanup(&path);
}

#[tokio::test]
async fn test_schema_cache_is_reused_between_questions() {
    let path = shop_db();
    let service = service(&path, ScriptedOracle::replying("SELECT name FROM users LIMIT 5"));

    let first = service.answer_question("list users", None).await;
    let second = service.answer_question("list user names", None).await;

    assert!(!first.metadata.unwrap().cache_hit);
    assert!(second.metadata.unwrap().cache_hit);
    let stats = service.cache().stats();
    assert_eq!((stats.misses, stats.hits, stats.refreshes), (1, 1, 0));

    cleanup(&path);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_write_statement_is_rejected_before_execution() {
    let path = shop_db();
    let service = service(&path, ScriptedOracle::replying("DELETE FROM users"));

    let response = service.answer_question("remove every user", None).await;

    assert!(!response.success);
    assert_eq!(response.error.as_ref().unwrap().code, "SAFETY_REJECTED");
    assert_eq!(response.failed_stage, Some(PipelineStage::Corrected));
    assert_eq!(response.sql_query.as_deref(), Some("DELETE FROM users"));

    let conn = rusqlite::Connection::open(&path).unwrap();
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 2);

    cleanup(&path);
}

#[tokio::test]
async fn test_oracle_failure_reports_guidance() {
    let path = shop_db();
    let service = service(&path, ScriptedOracle::failing("connection refused"));

    let response = service.answer_question("how many sales?", None).await;

    assert!(!response.success);
    assert_eq!(response.error.as_ref().unwrap().code, "DRAFTING_FAILED");
    assert_eq!(response.failed_stage, Some(PipelineStage::Planned));
    assert!(response.sql_query.is_none());

    let guidance = response.guidance.unwrap();
    let tables: Vec<&str> = guidance.available_tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, vec!["sales", "users"]);
    assert!(guidance.example_questions.contains(&"Show me all users".to_string()));
    assert!(guidance
        .suggestions
        .contains(&"Rephrase the question using table or column names".to_string()));

    cleanup(&path);
}

#[tokio::test]
async fn test_unknown_column_reports_execution_stage() {
    let path = shop_db();
    let service = service(&path, ScriptedOracle::replying("SELECT total FROM sales LIMIT 5"));

    let response = service.answer_question("sales totals", None).await;

    assert!(!response.success);
    assert_eq!(response.error.as_ref().unwrap().code, "EXECUTION_ERROR");
    assert_eq!(response.failed_stage, Some(PipelineStage::Gated));
    assert_eq!(
        response.guidance.unwrap().suggestions[0],
        "Column 'total' does not exist in any table"
    );

    cleanup(&path);
}

#[tokio::test]
async fn test_empty_question_is_invalid_input() {
    let path = shop_db();
    let oracle = ScriptedOracle::replying("SELECT 1");
    let service = service(&path, Arc::clone(&oracle));

    let response = service.answer_question("   ", None).await;

    assert_eq!(response.error.as_ref().unwrap().code, "INVALID_INPUT");
    assert_eq!(response.failed_stage, Some(PipelineStage::Received));
    assert!(oracle.prompts.lock().is_empty());

    cleanup(&path);
}

#[tokio::test]
async fn test_missing_database_is_schema_unavailable() {
    let path = std::env::temp_dir().join("querywise_pipeline_missing.db");
    let _ = std::fs::remove_file(&path);
    let Ok(gateway) =
        SqliteGateway::new(ConnectionConfig::sqlite(path.clone()), ExecutionLimits::default())
    else {
        // Gateways that check the file up front reject it here instead
        return;
    };
    let cache = Arc::new(SchemaCache::new(
        Arc::new(gateway),
        DomainProfile::default(),
        CacheSettings::default(),
        Arc::new(SystemClock),
    ));
    let service = QueryIntelligence::new(cache, ScriptedOracle::replying("SELECT 1"));

    let response = service.answer_question("how many users?", None).await;

    assert!(!response.success);
    assert_eq!(response.failed_stage, Some(PipelineStage::Received));
    let guidance = response.guidance.unwrap();
    assert!(guidance.available_tables.is_empty());
}

// ============================================================================
// Join paths over a real schema
// ============================================================================

#[tokio::test]
async fn test_join_path_follows_chain() {
    let path = create_db(
        "chain",
        &[
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, placed_on TEXT)",
            "CREATE TABLE shipments (id INTEGER PRIMARY KEY, order_id INTEGER, carrier_id INTEGER, shipped_on TEXT)",
            "CREATE TABLE carriers (id INTEGER PRIMARY KEY, label TEXT)",
        ],
    );
    let cache = cache_for(&path);
    assert!(cache.join_path(&["customers", "carriers"]).is_err());
    cache.schema_context().await.unwrap();

    let edges = cache.join_path(&["customers", "carriers"]).unwrap();
    let mut conditions: Vec<String> = edges.iter().map(|e| e.join_condition()).collect();
    conditions.sort();
    assert_eq!(
        conditions,
        vec![
            "orders.customer_id = customers.id",
            "shipments.carrier_id = carriers.id",
            "shipments.order_id = orders.id",
        ]
    );

    let again = cache.join_path(&["carriers", "customers"]).unwrap();
    assert_eq!(again.len(), 3);
    assert_eq!(cache.stats().relationship_entries, 1);

    cleanup(&path);
}
