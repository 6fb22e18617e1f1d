use rkyv::{Archive, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Opaque key naming a reference network at a remote source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NetworkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for NetworkId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
#[archive(check_bytes)]
pub struct NetworkNode {
    pub id: u64,
    pub name: Option<String>,
    pub represents: Option<String>,
    pub attributes: HashMap<String, String>,
}

#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
#[archive(check_bytes)]
pub struct NetworkEdge {
    pub id: u64,
    pub source: u64,
    pub target: u64,
    pub interaction: String,
    pub directed: bool,
    pub attributes: HashMap<String, String>,
}

/// Labeled multigraph: any number of edges may join the same node pair.
#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone, Default)]
#[archive(check_bytes)]
pub struct Network {
    pub name: Option<String>,
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

impl NetworkNode {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            represents: None,
            attributes: HashMap::new(),
        }
    }
}

impl NetworkEdge {
    pub fn new(id: u64, source: u64, target: u64, interaction: impl Into<String>) -> Self {
        Self {
            id,
            source,
            target,
            interaction: interaction.into(),
            directed: true,
            attributes: HashMap::new(),
        }
    }

    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }
}

impl Network {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: u64) -> Option<&NetworkNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: u64) -> Option<&NetworkEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// All node ids carrying `name`; names are not unique in CX documents.
    pub fn node_ids_named(&self, name: &str) -> Vec<u64> {
        self.nodes
            .iter()
            .filter(|node| node.name.as_deref() == Some(name))
            .map(|node| node.id)
            .collect()
    }

    pub fn remove_edge(&mut self, id: u64) -> Option<NetworkEdge> {
        let idx = self.edges.iter().position(|edge| edge.id == id)?;
        Some(self.edges.remove(idx))
    }

    pub fn retain_edges<F>(&mut self, keep: F)
    where
        F: FnMut(&NetworkEdge) -> bool,
    {
        self.edges.retain(keep);
    }

    /// Capture the current adjacency structure.
    pub fn edge_map(&self) -> EdgeMap {
        let mut map = EdgeMap::new();
        for edge in &self.edges {
            map.insert(edge);
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub edge_id: u64,
    pub interaction: String,
    pub directed: bool,
}

/// Adjacency snapshot: source node -> target node -> edges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeMap {
    adjacency: BTreeMap<u64, BTreeMap<u64, Vec<EdgeRecord>>>,
}

impl EdgeMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, edge: &NetworkEdge) {
        self.adjacency
            .entry(edge.source)
            .or_default()
            .entry(edge.target)
            .or_default()
            .push(EdgeRecord {
                edge_id: edge.id,
                interaction: edge.interaction.clone(),
                directed: edge.directed,
            });
    }

    pub fn edges_between(&self, source: u64, target: u64) -> &[EdgeRecord] {
        self.adjacency
            .get(&source)
            .and_then(|targets| targets.get(&target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency
            .values()
            .flat_map(|targets| targets.values())
            .map(Vec::len)
            .sum()
    }
}
