//! Relationship Graph
//!
//! Infers join relationships between tables from naming conventions and declared
//! foreign keys, and answers path questions over them.
//!
//! # Edge Kinds
//! - `Direct`: a foreign-key-like column points at another table's primary key
//!   (`sales.user_id → users.id`), or the catalog declares the foreign key
//! - `Indirect`: two tables carry a foreign-key-like column with the same base name
//!   (`orders.user_id`, `reviews.user_id`)
//! - `Junction`: two tables referenced by the same many-to-many bridge table
//!
//! Edges are inferences, not constraints. Adjacency is a symmetric view that is only
//! ever rebuilt from the edge list, and an edge is refused unless both endpoints are
//! known tables.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::engine::KeyRole;
use crate::error::{QueryError, Result};
use crate::schema::{strip_fk_suffix, TableSchema};

/// Kind of inferred relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Direct,
    Indirect,
    Junction,
}

impl EdgeKind {
    const fn priority(self) -> u8 {
        match self {
            Self::Direct => 0,
            Self::Indirect => 1,
            Self::Junction => 2,
        }
    }
}

/// A relationship between two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub kind: EdgeKind,

    /// Bridge table for `Junction` edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl RelationshipEdge {
    pub fn new(
        kind: EdgeKind,
        source: (&str, &str),
        target: (&str, &str),
    ) -> Self {
        Self {
            source_table: source.0.to_string(),
            source_column: source.1.to_string(),
            target_table: target.0.to_string(),
            target_column: target.1.to_string(),
            kind,
            via: None,
        }
    }

    /// Whether this edge touches both tables (either direction)
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_table == a && self.target_table == b)
            || (self.source_table == b && self.target_table == a)
    }

    /// `JOIN` condition text (`sales.user_id = users.id`)
    pub fn join_condition(&self) -> String {
        format!(
            "{}.{} = {}.{}",
            self.source_table, self.source_column, self.target_table, self.target_column
        )
    }
}

impl fmt::Display for RelationshipEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} → {}.{}",
            self.source_table, self.source_column, self.target_table, self.target_column
        )?;
        if let Some(via) = &self.via {
            write!(f, " (via {via})")?;
        }
        Ok(())
    }
}

/// Options that shape graph inference and join-path assembly
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Tables preferred as the join-path hub, in priority order
    #[serde(default)]
    pub anchor_tables: Vec<String>,
}

/// Inferred relationship graph over a schema snapshot
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    tables: Vec<TableSchema>,
    index: HashMap<String, usize>,
    edges: Vec<RelationshipEdge>,
    adjacency: HashMap<String, Vec<String>>,
    junctions: Vec<String>,
    anchors: Vec<String>,
}

impl RelationshipGraph {
    /// Build the graph for a set of tables
    pub fn build(tables: Vec<TableSchema>, options: &GraphOptions) -> Self {
        let index = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_lowercase(), i))
            .collect();

        let mut graph = Self {
            tables,
            index,
            edges: Vec::new(),
            adjacency: HashMap::new(),
            junctions: Vec::new(),
            anchors: options.anchor_tables.clone(),
        };

        for edge in graph.infer_direct_edges() {
            graph.push_edge(edge);
        }
        for edge in graph.declared_edges() {
            graph.push_edge(edge);
        }
        for edge in graph.infer_indirect_edges() {
            graph.push_edge(edge);
        }
        let (junctions, junction_edges) = graph.infer_junction_edges();
        graph.junctions = junctions;
        for edge in junction_edges {
            graph.push_edge(edge);
        }

        graph.rebuild_adjacency();
        graph
    }

    /// Tables in schema order
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Case-insensitive table lookup
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.index.get(&name.to_lowercase()).map(|&i| &self.tables[i])
    }

    /// Canonical spelling of a table name
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.table(name).map(TableSchema::name)
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    /// Edges touching a table
    pub fn edges_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RelationshipEdge> {
        self.edges
            .iter()
            .filter(move |e| e.source_table == table || e.target_table == table)
    }

    /// Tables flagged as many-to-many bridges
    pub fn junction_tables(&self) -> &[String] {
        &self.junctions
    }

    /// Neighbours in discovery order
    pub fn neighbors(&self, table: &str) -> &[String] {
        self.adjacency.get(table).map_or(&[], Vec::as_slice)
    }

    /// Add an edge after construction
    ///
    /// # Errors
    /// * `InvalidInput` if either endpoint is not a table in the graph
    pub fn add_edge(&mut self, mut edge: RelationshipEdge) -> Result<()> {
        for endpoint in [&mut edge.source_table, &mut edge.target_table] {
            let canonical = self.resolve(endpoint).map(str::to_string).ok_or_else(|| {
                QueryError::invalid_input(format!("Edge endpoint '{endpoint}' is not a known table"))
            })?;
            *endpoint = canonical;
        }
        self.push_edge(edge);
        self.rebuild_adjacency();
        Ok(())
    }

    /// Breadth-first shortest path between two tables
    ///
    /// Returns `[a]` when `a == b` and an empty list when `b` is unreachable or either
    /// table is unknown.
    pub fn shortest_path(&self, a: &str, b: &str) -> Vec<String> {
        let (Some(start), Some(goal)) = (self.resolve(a), self.resolve(b)) else {
            return Vec::new();
        };
        if start == goal {
            return vec![start.to_string()];
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<&str> = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                let next = next.as_str();
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, current);
                if next == goal {
                    let mut path = vec![goal.to_string()];
                    let mut cursor = goal;
                    while let Some(&parent) = parents.get(cursor) {
                        path.push(parent.to_string());
                        cursor = parent;
                    }
                    path.reverse();
                    return path;
                }
                queue.push_back(next);
            }
        }

        Vec::new()
    }

    /// Tables within `max_distance` hops, nearest first, excluding `table`
    pub fn related_tables(&self, table: &str, max_distance: usize) -> Vec<String> {
        let Some(start) = self.resolve(table) else {
            return Vec::new();
        };

        let mut related = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(start, 0)]);

        while let Some((current, distance)) = queue.pop_front() {
            if distance >= max_distance {
                continue;
            }
            for next in self.neighbors(current) {
                if visited.insert(next.as_str()) {
                    related.push(next.clone());
                    queue.push_back((next.as_str(), distance + 1));
                }
            }
        }

        related
    }

    /// Edges connecting a set of tables
    ///
    /// Starts from the first anchor table present in the set (else the first requested
    /// table) and repeatedly attaches the unconnected table with the globally shortest
    /// path, appending every edge along that path. Unknown and unreachable tables are
    /// left out.
    pub fn join_path<S: AsRef<str>>(&self, tables: &[S]) -> Vec<RelationshipEdge> {
        let mut requested: Vec<&str> = Vec::new();
        for name in tables {
            if let Some(resolved) = self.resolve(name.as_ref()) {
                if !requested.contains(&resolved) {
                    requested.push(resolved);
                }
            }
        }
        if requested.len() < 2 {
            return Vec::new();
        }

        let hub = self
            .anchors
            .iter()
            .find_map(|anchor| requested.iter().copied().find(|t| t.eq_ignore_ascii_case(anchor)))
            .unwrap_or(requested[0]);

        let mut connected: Vec<String> = vec![hub.to_string()];
        let mut pending: Vec<&str> = requested.into_iter().filter(|t| *t != hub).collect();
        let mut path_edges: Vec<RelationshipEdge> = Vec::new();

        while !pending.is_empty() {
            let mut best: Option<Vec<String>> = None;
            for target in &pending {
                for source in &connected {
                    let path = self.shortest_path(source, target);
                    if path.len() >= 2 && best.as_ref().map_or(true, |b| path.len() < b.len()) {
                        best = Some(path);
                    }
                }
            }

            let Some(path) = best else {
                break;
            };

            for hop in path.windows(2) {
                for edge in self.hop_edges(&hop[0], &hop[1]) {
                    if let Some(via) = &edge.via {
                        if !connected.contains(via) {
                            connected.push(via.clone());
                        }
                    }
                    for endpoint in [&edge.source_table, &edge.target_table] {
                        if !connected.contains(endpoint) {
                            connected.push(endpoint.clone());
                        }
                    }
                    if !path_edges.contains(&edge) {
                        path_edges.push(edge);
                    }
                }
            }
            for table in &path {
                if !connected.contains(table) {
                    connected.push(table.clone());
                }
            }
            pending.retain(|t| !connected.iter().any(|c| c == t));
        }

        path_edges
    }

    /// Edges realising one hop of a path
    ///
    /// The strongest edge kind wins. A junction hop is expanded into the two direct
    /// edges through its bridge table when they exist.
    fn hop_edges(&self, a: &str, b: &str) -> Vec<RelationshipEdge> {
        let Some(edge) = self
            .edges
            .iter()
            .filter(|e| e.connects(a, b))
            .min_by_key(|e| e.kind.priority())
        else {
            return Vec::new();
        };

        if let (EdgeKind::Junction, Some(via)) = (edge.kind, &edge.via) {
            let through: Vec<RelationshipEdge> = [a, b]
                .iter()
                .filter_map(|end| {
                    self.edges
                        .iter()
                        .find(|e| e.kind == EdgeKind::Direct && e.connects(via, end))
                        .cloned()
                })
                .collect();
            if through.len() == 2 {
                return through;
            }
        }

        vec![edge.clone()]
    }

    fn push_edge(&mut self, edge: RelationshipEdge) {
        let duplicate = self.edges.iter().any(|e| {
            e.connects(&edge.source_table, &edge.target_table)
                && e.kind == edge.kind
                && ((e.source_table == edge.source_table
                    && e.source_column == edge.source_column
                    && e.target_column == edge.target_column)
                    || (e.source_table == edge.target_table
                        && e.source_column == edge.target_column
                        && e.target_column == edge.source_column))
        });
        if !duplicate && edge.source_table != edge.target_table {
            self.edges.push(edge);
        }
    }

    fn rebuild_adjacency(&mut self) {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &self.edges {
            for (from, to) in [
                (&edge.source_table, &edge.target_table),
                (&edge.target_table, &edge.source_table),
            ] {
                let neighbours = adjacency.entry(from.clone()).or_default();
                if !neighbours.contains(to) {
                    neighbours.push(to.clone());
                }
            }
        }
        self.adjacency = adjacency;
    }

    /// Table whose name is a singular/plural variant of `base`
    fn match_table(&self, base: &str) -> Option<&TableSchema> {
        let mut variants = vec![base.to_string(), format!("{base}s"), format!("{base}es")];
        if let Some(stem) = base.strip_suffix('y') {
            variants.push(format!("{stem}ies"));
        }
        variants.iter().find_map(|v| self.table(v))
    }

    fn infer_direct_edges(&self) -> Vec<RelationshipEdge> {
        let mut edges = Vec::new();
        for table in &self.tables {
            for column in table.foreign_keys() {
                let Some(base) = strip_fk_suffix(column) else {
                    continue;
                };
                let Some(target) = self.match_table(&base) else {
                    continue;
                };
                if let Some(pk) = id_equivalent_key(target, &base) {
                    edges.push(RelationshipEdge::new(
                        EdgeKind::Direct,
                        (table.name(), column),
                        (target.name(), pk),
                    ));
                }
            }
        }
        edges
    }

    fn declared_edges(&self) -> Vec<RelationshipEdge> {
        let mut edges = Vec::new();
        for table in &self.tables {
            for fk in table.declared_foreign_keys() {
                let (Some(target), [column], [referenced]) = (
                    self.resolve(&fk.referenced_table),
                    fk.columns.as_slice(),
                    fk.referenced_columns.as_slice(),
                ) else {
                    continue;
                };
                edges.push(RelationshipEdge::new(
                    EdgeKind::Direct,
                    (table.name(), column.as_str()),
                    (target, referenced.as_str()),
                ));
            }
        }
        edges
    }

    fn infer_indirect_edges(&self) -> Vec<RelationshipEdge> {
        // base name → (table, column), first column per table, in table order
        let mut groups: Vec<(String, Vec<(&str, &str)>)> = Vec::new();
        for table in &self.tables {
            for column in table.foreign_keys() {
                let Some(base) = strip_fk_suffix(column) else {
                    continue;
                };
                let slot = match groups.iter().position(|(b, _)| *b == base) {
                    Some(slot) => slot,
                    None => {
                        groups.push((base, Vec::new()));
                        groups.len() - 1
                    }
                };
                let members = &mut groups[slot].1;
                if !members.iter().any(|(t, _)| *t == table.name()) {
                    members.push((table.name(), column));
                }
            }
        }

        let mut edges = Vec::new();
        for (_, members) in &groups {
            for (i, left) in members.iter().enumerate() {
                for right in &members[i + 1..] {
                    edges.push(RelationshipEdge::new(EdgeKind::Indirect, *left, *right));
                }
            }
        }
        edges
    }

    fn infer_junction_edges(&self) -> (Vec<String>, Vec<RelationshipEdge>) {
        let mut junctions = Vec::new();
        let mut edges = Vec::new();

        for table in &self.tables {
            let fk_count = table.foreign_keys().len();
            if fk_count < 2 || fk_count * 2 <= table.columns().len() {
                continue;
            }
            junctions.push(table.name().to_string());

            let mut targets: Vec<(&str, &str)> = Vec::new();
            for edge in &self.edges {
                if edge.kind == EdgeKind::Direct && edge.source_table == table.name() {
                    let target = (edge.target_table.as_str(), edge.target_column.as_str());
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }

            for (i, left) in targets.iter().enumerate() {
                for right in &targets[i + 1..] {
                    let mut edge = RelationshipEdge::new(EdgeKind::Junction, *left, *right);
                    edge.via = Some(table.name().to_string());
                    edges.push(edge);
                }
            }
        }

        (junctions, edges)
    }
}

/// Primary key column that an `<base>_id` column can join to
fn id_equivalent_key<'a>(table: &'a TableSchema, base: &str) -> Option<&'a str> {
    let table_key = format!("{}_id", table.name().to_lowercase());
    let base_key = format!("{base}_id");
    table
        .columns()
        .iter()
        .filter(|c| c.key_role == KeyRole::Primary)
        .map(|c| c.name.as_str())
        .find(|name| {
            let lower = name.to_lowercase();
            lower == "id" || lower == table_key || lower == base_key
        })
}
