//! Graph view over cached metadata.

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::Dfs,
    Direction,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::metadata::{Metadata, TypeRelationship};

/// Directed graph of fully qualified type names connected by [`TypeRelationship`] edges.
///
/// Built from a schema snapshot; it never triggers extraction. Edge targets that are not cached
/// (e.g. after an inspect, which does not extract its targets) still appear as nodes.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    graph: DiGraph<String, TypeRelationship>,
    index: BTreeMap<String, NodeIndex>,
}

impl SchemaGraph {
    pub fn from_schema(schema: &BTreeMap<String, Arc<Metadata>>) -> Self {
        let mut graph = SchemaGraph::default();
        for (name, meta) in schema.iter() {
            let source = graph.node(name);
            for relationship in meta.relationships.iter() {
                let sink = graph.node(&relationship.to_qualified_name);
                graph.graph.add_edge(source, sink, relationship.clone());
            }
        }
        graph
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn as_graph(&self) -> &DiGraph<String, TypeRelationship> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.index.contains_key(qualified_name)
    }

    /// Outgoing edges of `qualified_name`.
    pub fn edges_from(&self, qualified_name: &str) -> Vec<&TypeRelationship> {
        let Some(idx) = self.index.get(qualified_name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|edge| edge.weight())
            .collect()
    }

    /// Types directly referenced by `qualified_name`.
    pub fn neighbors(&self, qualified_name: &str) -> BTreeSet<String> {
        let Some(idx) = self.index.get(qualified_name) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(*idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Types that reference `qualified_name`.
    pub fn referenced_by(&self, qualified_name: &str) -> BTreeSet<String> {
        let Some(idx) = self.index.get(qualified_name) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(*idx, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Every type reachable from `qualified_name`, excluding itself unless it sits on a cycle.
    pub fn reachable_from(&self, qualified_name: &str) -> BTreeSet<String> {
        let Some(start) = self.index.get(qualified_name) else {
            return BTreeSet::new();
        };
        let mut dfs = Dfs::empty(&self.graph);
        dfs.stack
            .extend(self.graph.neighbors_directed(*start, Direction::Outgoing));
        let mut reached = BTreeSet::new();
        while let Some(node) = dfs.next(&self.graph) {
            reached.insert(self.graph[node].clone());
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{descriptor::TypeDescriptor, metadata::RelationKind};

    fn meta(name: &str, targets: &[&str]) -> (String, Arc<Metadata>) {
        let mut meta = Metadata::empty(&TypeDescriptor::record(name, "acme"));
        meta.relationships = targets
            .iter()
            .map(|t| TypeRelationship {
                from: name.to_string(),
                to: t.to_string(),
                field: format!("field_{t}"),
                kind: RelationKind::Reference,
                to_domain: "acme".to_string(),
                to_qualified_name: format!("acme::{t}"),
            })
            .collect();
        (meta.qualified_name.clone(), Arc::new(meta))
    }

    #[test]
    fn test_graph_queries() {
        let schema = BTreeMap::from([
            meta("A", &["B"]),
            meta("B", &["C", "A"]),
            meta("C", &[]),
            meta("D", &["E"]),
        ]);
        let graph = SchemaGraph::from_schema(&schema);

        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.contains("acme::E"));
        assert_eq!(
            graph.neighbors("acme::B"),
            BTreeSet::from(["acme::A".to_string(), "acme::C".to_string()])
        );
        assert_eq!(
            graph.referenced_by("acme::A"),
            BTreeSet::from(["acme::B".to_string()])
        );
        assert_eq!(
            graph.reachable_from("acme::A"),
            BTreeSet::from([
                "acme::A".to_string(),
                "acme::B".to_string(),
                "acme::C".to_string()
            ])
        );
        assert!(graph.reachable_from("acme::C").is_empty());
        assert_eq!(graph.edges_from("acme::D")[0].field, "field_E");
        assert!(graph.neighbors("acme::missing").is_empty());
    }
}
