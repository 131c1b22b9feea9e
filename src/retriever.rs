//! Context Retrieval
//!
//! A [`ContextProvider`] turns the cached schema context into the context handed to the
//! drafting oracle. The provider is chosen once at startup, in fixed priority:
//! semantic retrieval when a [`KnowledgeRetriever`] is supplied, then the relationship
//! graph, then the plain schema context.
//!
//! Retrieval failures are never fatal. A retriever error degrades the request to the
//! graph-only context and is logged.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::oracle::enhance_for_multi_table;
use crate::planner::QueryPlan;
use crate::profile::Workflow;
use crate::schema::{SchemaCache, SchemaSnapshot};

/// Characters of semantic context merged into a prompt
pub const SEMANTIC_CONTEXT_CHARS: usize = 1_000;

/// Optional knowledge service (vector search over domain documents, for example)
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Tables the knowledge base associates with a question
    async fn related_tables(&self, question: &str) -> Result<Vec<String>>;

    /// Free-text background for a question, at most `max_len` characters
    async fn build_context(&self, question: &str, max_len: usize) -> Result<String>;
}

/// Strategy for building oracle context
#[derive(Clone)]
pub enum ContextProvider {
    Semantic(Arc<dyn KnowledgeRetriever>),
    RelationshipGraph,
    SchemaOnly,
}

impl std::fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

impl ContextProvider {
    /// Highest-priority provider available
    pub fn select(retriever: Option<Arc<dyn KnowledgeRetriever>>, use_graph: bool) -> Self {
        match retriever {
            Some(retriever) => Self::Semantic(retriever),
            None if use_graph => Self::RelationshipGraph,
            None => Self::SchemaOnly,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Semantic(_) => "semantic",
            Self::RelationshipGraph => "relationship_graph",
            Self::SchemaOnly => "schema_only",
        }
    }

    /// Oracle context for one question
    ///
    /// Single-table plans get the cached schema context unchanged. Multi-table plans
    /// get the multi-table block, with a join path unless the provider is schema-only.
    pub async fn build(
        &self,
        question: &str,
        plan: &QueryPlan,
        cache: &SchemaCache,
        snapshot: &SchemaSnapshot,
    ) -> String {
        if !plan.requires_multiple_tables {
            return snapshot.context.clone();
        }

        let mut tables = plan.suggested_tables.clone();
        let mut semantic = None;

        if let Self::Semantic(retriever) = self {
            match retriever.related_tables(question).await {
                Ok(related) => {
                    for table in related {
                        let Some(name) = snapshot.graph.resolve(&table) else {
                            continue;
                        };
                        if !tables.iter().any(|t| t == name) {
                            tables.push(name.to_string());
                        }
                    }
                }
                Err(e) => warn!(error = %e, "knowledge retriever failed to relate tables"),
            }
            match retriever.build_context(question, SEMANTIC_CONTEXT_CHARS).await {
                Ok(text) if !text.trim().is_empty() => semantic = Some(text),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "knowledge retriever failed to build context"),
            }
        }

        let join_path = match self {
            Self::SchemaOnly => Vec::new(),
            _ => cache.join_path(&tables).unwrap_or_else(|e| {
                warn!(error = %e, "join path unavailable");
                Vec::new()
            }),
        };

        let workflows: Vec<&Workflow> = cache.profile().workflows_for(&tables).collect();
        let mut context = enhance_for_multi_table(&snapshot.context, plan, &join_path, &workflows);

        if let Some(text) = semantic {
            let text: String = text.chars().take(SEMANTIC_CONTEXT_CHARS).collect();
            context.push_str("\nDOMAIN KNOWLEDGE:\n");
            context.push_str(text.trim_end());
            context.push('\n');
        }
        context
    }
}
