//! Schema Cache
//!
//! Keeps the current [`SchemaSnapshot`] and a bounded cache of computed join paths.
//!
//! # Refresh Rules
//! Every lookup re-lists and re-describes the tables to compute the schema hash. The
//! cached snapshot is served only while it is younger than the TTL and its hash still
//! matches; otherwise both caches are dropped and a new snapshot is built.
//!
//! # Concurrency
//! The snapshot is published through `ArcSwap`, so readers never see a half-built
//! value and a failed rebuild leaves the previous snapshot in place. The join-path
//! map sits behind a `parking_lot::Mutex` that is never held across an `.await`.
//! Join-path keys carry the hash of the snapshot they were computed from, so a path
//! stored late by a reader of an older snapshot is never served for a newer one.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::{ColumnInfo, DatabaseGateway};
use crate::error::{QueryError, Result};
use crate::graph::{RelationshipEdge, RelationshipGraph};
use crate::profile::DomainProfile;
use crate::schema::context::render_schema_context;
use crate::schema::{hash_tables, table_set_key, TableSchema};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Cache tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Minutes a snapshot or join path stays valid
    pub ttl_minutes: i64,

    /// Join-path entries kept before the oldest is evicted
    pub max_relationship_entries: usize,

    /// Sample rows fetched per table
    pub sample_rows: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_minutes: 30, max_relationship_entries: 100, sample_rows: 3 }
    }
}

/// A timestamped cache value
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
    pub ttl_minutes: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(
        key: impl Into<String>,
        payload: T,
        timestamp: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> Self {
        Self { key: key.into(), timestamp, payload, ttl_minutes }
    }

    /// Whether the entry may still be served at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp < Duration::minutes(self.ttl_minutes)
    }
}

/// Everything known about the database at one point in time
#[derive(Debug)]
pub struct SchemaSnapshot {
    pub database: String,
    pub hash: String,
    pub built_at: DateTime<Utc>,
    pub graph: RelationshipGraph,

    /// Rendered schema context for the drafting oracle
    pub context: String,
}

impl SchemaSnapshot {
    pub fn new(
        database: impl Into<String>,
        hash: impl Into<String>,
        graph: RelationshipGraph,
        built_at: DateTime<Utc>,
    ) -> Self {
        let database = database.into();
        let context = render_schema_context(&database, &graph);
        Self { database, hash: hash.into(), built_at, graph, context }
    }

    pub fn tables(&self) -> &[TableSchema] {
        self.graph.tables()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.graph.tables().iter().map(TableSchema::name).collect()
    }
}

/// Result of a schema lookup
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub snapshot: Arc<SchemaSnapshot>,
    pub cache_hit: bool,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub relationship_entries: usize,
}

/// Schema snapshot and join-path cache for one database
pub struct SchemaCache {
    gateway: Arc<dyn DatabaseGateway>,
    profile: DomainProfile,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    snapshot: ArcSwapOption<CacheEntry<Arc<SchemaSnapshot>>>,
    relationships: Mutex<HashMap<String, CacheEntry<Vec<RelationshipEdge>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
}

impl SchemaCache {
    pub fn new(
        gateway: Arc<dyn DatabaseGateway>,
        profile: DomainProfile,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            profile,
            settings,
            clock,
            snapshot: ArcSwapOption::empty(),
            relationships: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn DatabaseGateway> {
        &self.gateway
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    /// Current schema snapshot, rebuilt when stale or drifted
    ///
    /// # Errors
    /// * `SchemaUnavailable` if introspection fails; the previous snapshot is kept
    pub async fn schema_context(&self) -> Result<CachedSchema> {
        let described = self.describe_all().await?;
        let hash = hash_tables(&described);
        let now = self.clock.now();

        if let Some(entry) = self.snapshot.load_full() {
            let fresh = entry.is_fresh(now);
            if fresh && entry.key == hash {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(hash = %hash, "schema cache hit");
                return Ok(CachedSchema { snapshot: Arc::clone(&entry.payload), cache_hit: true });
            }
            info!(
                expired = !fresh,
                drifted = entry.key != hash,
                "schema cache invalidated"
            );
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let snapshot = Arc::new(self.build_snapshot(described, hash.clone(), now).await);
        self.relationships.lock().clear();
        self.snapshot.store(Some(Arc::new(CacheEntry::new(
            hash,
            Arc::clone(&snapshot),
            now,
            self.settings.ttl_minutes,
        ))));

        info!(
            tables = snapshot.tables().len(),
            edges = snapshot.graph.edges().len(),
            "schema snapshot built"
        );
        Ok(CachedSchema { snapshot, cache_hit: false })
    }

    /// Join path for a set of tables over the current snapshot
    ///
    /// # Errors
    /// * `SchemaUnavailable` if no snapshot has been built yet
    pub fn join_path<S: AsRef<str>>(&self, tables: &[S]) -> Result<Vec<RelationshipEdge>> {
        let entry = self
            .snapshot
            .load_full()
            .ok_or_else(|| QueryError::schema_unavailable("Schema has not been loaded"))?;

        let key = relationship_key(&entry.key, tables);
        let now = self.clock.now();

        if let Some(cached) = self.relationships.lock().get(&key) {
            if cached.is_fresh(now) {
                debug!(key = %key, "relationship cache hit");
                return Ok(cached.payload.clone());
            }
        }

        let path = entry.payload.graph.join_path(tables);

        let mut relationships = self.relationships.lock();
        relationships.insert(
            key.clone(),
            CacheEntry::new(key, path.clone(), now, self.settings.ttl_minutes),
        );
        while relationships.len() > self.settings.max_relationship_entries {
            let Some(oldest) = relationships
                .values()
                .min_by_key(|e| e.timestamp)
                .map(|e| e.key.clone())
            else {
                break;
            };
            relationships.remove(&oldest);
        }

        Ok(path)
    }

    /// Last published snapshot, without refreshing
    pub fn current(&self) -> Option<Arc<SchemaSnapshot>> {
        self.snapshot.load_full().map(|entry| Arc::clone(&entry.payload))
    }

    /// Drop the snapshot and every cached join path
    pub fn invalidate(&self) {
        self.snapshot.store(None);
        self.relationships.lock().clear();
        info!("schema cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            relationship_entries: self.relationships.lock().len(),
        }
    }

    async fn describe_all(&self) -> Result<Vec<(String, Vec<ColumnInfo>)>> {
        let tables = self.gateway.list_tables().await.map_err(introspection_failed)?;

        let mut described = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = self.gateway.describe_table(&table).await.map_err(introspection_failed)?;
            described.push((table, columns));
        }
        Ok(described)
    }

    /// Row counts, samples and declared keys are best effort
    async fn build_snapshot(
        &self,
        described: Vec<(String, Vec<ColumnInfo>)>,
        hash: String,
        now: DateTime<Utc>,
    ) -> SchemaSnapshot {
        let mut tables = Vec::with_capacity(described.len());

        for (name, columns) in described {
            let mut table = TableSchema::new(name.clone(), columns);

            match self.gateway.row_count(&name).await {
                Ok(count) => table = table.with_row_count(count),
                Err(e) => warn!(table = %name, error = %e, "row count unavailable"),
            }
            if self.settings.sample_rows > 0 {
                match self.gateway.sample_rows(&name, self.settings.sample_rows).await {
                    Ok(sample) => table = table.with_sample_rows(sample),
                    Err(e) => warn!(table = %name, error = %e, "sample rows unavailable"),
                }
            }
            match self.gateway.foreign_keys(&name).await {
                Ok(fks) => table = table.with_declared_foreign_keys(fks),
                Err(e) => warn!(table = %name, error = %e, "declared foreign keys unavailable"),
            }

            tables.push(table);
        }

        let graph = RelationshipGraph::build(tables, &self.profile.graph_options());
        SchemaSnapshot::new(self.gateway.database_name(), hash, graph, now)
    }
}

/// Join-path cache key scoped to one schema hash
fn relationship_key<S: AsRef<str>>(hash: &str, tables: &[S]) -> String {
    format!("{hash}:{}", table_set_key(tables))
}

fn introspection_failed(e: QueryError) -> QueryError {
    match e {
        QueryError::SchemaUnavailable(_) => e,
        other => QueryError::schema_unavailable(other.message()),
    }
}
