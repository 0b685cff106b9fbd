//! # Compatibility Graph
//!
//! In-memory product compatibility graph built from the catalog.
//!
//! Nodes are products keyed by canonical [`ProductId`]. Edges are undirected
//! and labelled: between two products there may be several relationships,
//! each with its own priority (lower is preferred). All storage is
//! `BTreeMap`, so every traversal result is deterministically ordered.

use crate::ProductId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A product as stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Id as written in the catalog.
    pub id: ProductId,
    pub name: String,
    pub category: String,
    /// Listing priority used when no prior selection constrains the stage.
    pub priority: u32,
}

/// One product reached by a [`GraphQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMatch {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub priority: u32,
}

/// Traversal request: from `sources`, follow edges into `category`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphQuery {
    pub sources: Vec<ProductId>,
    pub category: String,
    /// Only follow edges with this relationship. `None` follows all.
    pub relationship: Option<String>,
    /// Drop results that are also neighbors of these products.
    pub exclude_from: Vec<ProductId>,
}

impl GraphQuery {
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_sources(mut self, sources: Vec<ProductId>) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn relationship(mut self, relationship: Option<String>) -> Self {
        self.relationship = relationship;
        self
    }

    #[must_use]
    pub fn excluding(mut self, exclude_from: Vec<ProductId>) -> Self {
        self.exclude_from = exclude_from;
        self
    }
}

type Relationships = BTreeMap<String, u32>;

/// Undirected, labelled product graph.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityGraph {
    /// Canonical id -> node
    nodes: BTreeMap<ProductId, GraphNode>,

    /// Adjacency: canonical id -> (canonical id -> relationship -> priority)
    edges: BTreeMap<ProductId, BTreeMap<ProductId, Relationships>>,
}

impl CompatibilityGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. Returns the canonical key.
    pub fn insert_node(&mut self, node: GraphNode) -> ProductId {
        let key = node.id.canonical();
        self.nodes.insert(key.clone(), node);
        key
    }

    /// Insert an edge in both directions.
    ///
    /// Both endpoints must already exist; otherwise nothing is inserted and
    /// `false` is returned. Re-inserting a relationship keeps the lower
    /// priority.
    pub fn insert_edge(
        &mut self,
        a: &ProductId,
        b: &ProductId,
        relationship: &str,
        priority: u32,
    ) -> bool {
        let a = a.canonical();
        let b = b.canonical();
        if !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            return false;
        }
        for (from, to) in [(&a, &b), (&b, &a)] {
            let slot = self
                .edges
                .entry(from.clone())
                .or_default()
                .entry(to.clone())
                .or_default()
                .entry(relationship.to_string())
                .or_insert(priority);
            *slot = (*slot).min(priority);
        }
        true
    }

    #[must_use]
    pub fn lookup(&self, id: &ProductId) -> Option<&GraphNode> {
        self.nodes.get(&id.canonical())
    }

    /// Neighbors of a node with their relationship maps, in key order.
    pub fn neighbors(&self, id: &ProductId) -> impl Iterator<Item = (&ProductId, &Relationships)> {
        self.edges.get(&id.canonical()).into_iter().flat_map(|targets| targets.iter())
    }

    /// Best priority of the edge between two nodes, for a relationship.
    #[must_use]
    pub fn edge_priority(&self, a: &ProductId, b: &ProductId, relationship: Option<&str>) -> Option<u32> {
        let rels = self.edges.get(&a.canonical())?.get(&b.canonical())?;
        best_priority(rels, relationship)
    }

    /// Products of one category, by listing priority.
    #[must_use]
    pub fn in_category(&self, category: &str) -> Vec<GraphMatch> {
        let mut matches: Vec<GraphMatch> = self
            .nodes
            .values()
            .filter(|node| node.category == category)
            .map(|node| to_match(node, node.priority))
            .collect();
        sort_matches(&mut matches);
        matches
    }

    /// Run a traversal.
    ///
    /// With no sources this lists the whole category. Otherwise it returns
    /// the union of the sources' neighbors in the category, each with the
    /// lowest edge priority seen, minus anything adjacent to `exclude_from`.
    #[must_use]
    pub fn query(&self, query: &GraphQuery, limit: usize) -> Vec<GraphMatch> {
        if query.sources.is_empty() {
            let mut all = self.in_category(&query.category);
            all.truncate(limit);
            return all;
        }

        let relationship = query.relationship.as_deref();
        let mut reached: BTreeMap<&ProductId, u32> = BTreeMap::new();

        for source in &query.sources {
            for (neighbor, rels) in self.neighbors(source) {
                let Some(node) = self.nodes.get(neighbor) else {
                    continue;
                };
                if node.category != query.category {
                    continue;
                }
                let Some(priority) = best_priority(rels, relationship) else {
                    continue;
                };
                reached
                    .entry(neighbor)
                    .and_modify(|p| *p = (*p).min(priority))
                    .or_insert(priority);
            }
        }

        let excluded: BTreeSet<&ProductId> = query
            .exclude_from
            .iter()
            .flat_map(|other| self.neighbors(other).map(|(n, _)| n))
            .collect();

        let mut matches: Vec<GraphMatch> = reached
            .into_iter()
            .filter(|(id, _)| !excluded.contains(id))
            .filter_map(|(id, priority)| self.nodes.get(id).map(|node| to_match(node, priority)))
            .collect();
        sort_matches(&mut matches);
        matches.truncate(limit);
        matches
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of undirected edges (node pairs), regardless of relationships.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum::<usize>() / 2
    }
}

fn best_priority(rels: &Relationships, relationship: Option<&str>) -> Option<u32> {
    match relationship {
        Some(name) => rels.get(name).copied(),
        None => rels.values().copied().min(),
    }
}

fn to_match(node: &GraphNode, priority: u32) -> GraphMatch {
    GraphMatch {
        id: node.id.clone(),
        name: node.name.clone(),
        category: node.category.clone(),
        priority,
    }
}

fn sort_matches(matches: &mut [GraphMatch]) {
    matches.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.canonical().cmp(&b.id.canonical()))
    });
}

// =============================================================================
// TESTS
// =============================================================================
