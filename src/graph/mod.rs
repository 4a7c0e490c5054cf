//! Knowledge graph boundary
//!
//! Extraction results land here as typed, directed relationships between
//! entity uids. [`InMemoryGraph`] keeps them in process and supports
//! neighborhood traversal and DOT export.

use std::collections::{BTreeSet, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Directed edge between two uids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub source_uid: String,
    pub target_uid: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
    /// Free-text description, e.g. from the extraction model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl GraphRelationship {
    pub fn new(
        source_uid: impl Into<String>,
        target_uid: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            source_uid: source_uid.into(),
            target_uid: target_uid.into(),
            relationship_type: relationship_type.into(),
            created: Utc::now(),
            weight: None,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.source_uid, &self.target_uid, &self.relationship_type)
    }
}

#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    async fn add_relationship(&self, relationship: GraphRelationship) -> Result<()>;
}

/// Process-local graph. Re-adding an edge with the same source, target and
/// type replaces its notes and weight.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    edges: RwLock<Vec<GraphRelationship>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relationships(&self) -> Vec<GraphRelationship> {
        self.edges.read().clone()
    }

    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }

    /// Edges touching `uid` in either direction
    pub fn edges_of(&self, uid: &str) -> Vec<GraphRelationship> {
        self.edges
            .read()
            .iter()
            .filter(|e| e.source_uid == uid || e.target_uid == uid)
            .cloned()
            .collect()
    }

    /// Uids reachable from `center` within `depth` hops, ignoring direction.
    /// The center itself is not included.
    pub fn neighborhood(&self, center: &str, depth: usize) -> BTreeSet<String> {
        let edges = self.edges.read();
        let mut visited: HashSet<&str> = HashSet::from([center]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(center, 0)]);

        while let Some((current, d)) = queue.pop_front() {
            if d >= depth {
                continue;
            }
            for edge in edges.iter() {
                let next = if edge.source_uid == current {
                    edge.target_uid.as_str()
                } else if edge.target_uid == current {
                    edge.source_uid.as_str()
                } else {
                    continue;
                };
                if visited.insert(next) {
                    queue.push_back((next, d + 1));
                }
            }
        }

        visited
            .into_iter()
            .filter(|uid| *uid != center)
            .map(String::from)
            .collect()
    }

    /// Export as GraphViz DOT
    pub fn to_dot(&self) -> String {
        let escape = |s: &str| s.replace('"', "\\\"");
        let mut dot = String::from("digraph knowledge_graph {\n    rankdir=LR;\n");
        for edge in self.edges.read().iter() {
            dot.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                escape(&edge.source_uid),
                escape(&edge.target_uid),
                escape(&edge.relationship_type)
            ));
        }
        dot.push_str("}\n");
        dot
    }
}

#[async_trait]
impl KnowledgeGraph for InMemoryGraph {
    async fn add_relationship(&self, relationship: GraphRelationship) -> Result<()> {
        let mut edges = self.edges.write();
        if let Some(existing) = edges.iter_mut().find(|e| e.key() == relationship.key()) {
            existing.notes = relationship.notes;
            existing.weight = relationship.weight;
        } else {
            edges.push(relationship);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn graph(edges: &[(&str, &str, &str)]) -> InMemoryGraph {
        let graph = InMemoryGraph::new();
        for (from, to, kind) in edges {
            graph
                .add_relationship(GraphRelationship::new(*from, *to, *kind))
                .await
                .unwrap();
        }
        graph
    }

    #[tokio::test]
    async fn test_duplicate_edges_merge() {
        let graph = graph(&[("a", "b", "mentions")]).await;
        graph
            .add_relationship(GraphRelationship::new("a", "b", "mentions").with_notes("again"))
            .await
            .unwrap();
        graph
            .add_relationship(GraphRelationship::new("a", "b", "works_on"))
            .await
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges_of("b")[0].notes.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn test_neighborhood() {
        let graph = graph(&[
            ("a", "b", "x"),
            ("b", "c", "x"),
            ("d", "c", "x"),
            ("e", "f", "x"),
        ])
        .await;

        let one: Vec<_> = graph.neighborhood("b", 1).into_iter().collect();
        assert_eq!(one, vec!["a", "c"]);

        let two: Vec<_> = graph.neighborhood("a", 3).into_iter().collect();
        assert_eq!(two, vec!["b", "c", "d"]);

        assert!(graph.neighborhood("a", 0).is_empty());
    }

    #[tokio::test]
    async fn test_to_dot() {
        let graph = graph(&[("Daily/2024-01-01", "Alice \"A\"", "mentions")]).await;
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph knowledge_graph {"));
        assert!(dot.contains("\"Daily/2024-01-01\" -> \"Alice \\\"A\\\"\" [label=\"mentions\"];"));
    }
}
