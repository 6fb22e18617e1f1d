//! Reader for the NDEx CX network exchange format.
//!
//! A CX document is a JSON array of aspect fragments, each an object keyed by
//! aspect name. The same aspect may appear in several fragments, and
//! attributes may precede the elements they describe.

use crate::model::{Network, NetworkEdge, NetworkNode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CxError {
    #[error("document is not a CX aspect list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed '{aspect}' aspect: {reason}")]
    InvalidAspect { aspect: &'static str, reason: String },
    #[error("duplicate node id {0}")]
    DuplicateNode(u64),
    #[error("duplicate edge id {0}")]
    DuplicateEdge(u64),
    #[error("edge {edge} references unknown node {node}")]
    DanglingEdge { edge: u64, node: u64 },
}

#[derive(Deserialize)]
struct CxNode {
    #[serde(rename = "@id")]
    id: u64,
    #[serde(rename = "n", default)]
    name: Option<String>,
    #[serde(rename = "r", default)]
    represents: Option<String>,
}

#[derive(Deserialize)]
struct CxEdge {
    #[serde(rename = "@id")]
    id: u64,
    #[serde(rename = "s")]
    source: u64,
    #[serde(rename = "t")]
    target: u64,
    #[serde(rename = "i", default)]
    interaction: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropertyOwner {
    One(u64),
    Many(Vec<u64>),
}

#[derive(Deserialize)]
struct CxAttribute {
    #[serde(rename = "po")]
    owner: PropertyOwner,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "v", default)]
    value: Value,
}

#[derive(Deserialize)]
struct CxNetworkAttribute {
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "v", default)]
    value: Value,
}

#[derive(Default)]
struct Aspects {
    nodes: Vec<CxNode>,
    edges: Vec<CxEdge>,
    node_attributes: Vec<CxAttribute>,
    edge_attributes: Vec<CxAttribute>,
    network_attributes: Vec<CxNetworkAttribute>,
}

/// Parse a CX document into a [`Network`].
pub fn parse_cx(bytes: &[u8]) -> Result<Network, CxError> {
    let fragments: Vec<Map<String, Value>> = serde_json::from_slice(bytes)?;
    let mut aspects = Aspects::default();

    for fragment in fragments {
        for (key, value) in fragment {
            match key.as_str() {
                "nodes" => aspects.nodes.extend(aspect::<CxNode>("nodes", value)?),
                "edges" => aspects.edges.extend(aspect::<CxEdge>("edges", value)?),
                "nodeAttributes" => aspects
                    .node_attributes
                    .extend(aspect::<CxAttribute>("nodeAttributes", value)?),
                "edgeAttributes" => aspects
                    .edge_attributes
                    .extend(aspect::<CxAttribute>("edgeAttributes", value)?),
                "networkAttributes" => aspects
                    .network_attributes
                    .extend(aspect::<CxNetworkAttribute>("networkAttributes", value)?),
                _ => {}
            }
        }
    }

    assemble(aspects)
}

fn aspect<T: for<'de> Deserialize<'de>>(
    name: &'static str,
    value: Value,
) -> Result<Vec<T>, CxError> {
    serde_json::from_value(value).map_err(|err| CxError::InvalidAspect {
        aspect: name,
        reason: err.to_string(),
    })
}

fn assemble(aspects: Aspects) -> Result<Network, CxError> {
    let name = aspects
        .network_attributes
        .iter()
        .find(|attr| attr.name == "name")
        .map(|attr| attribute_text(&attr.value));
    let mut network = Network::new(name);

    let mut node_index: HashMap<u64, usize> = HashMap::with_capacity(aspects.nodes.len());
    for node in aspects.nodes {
        if node_index.insert(node.id, network.nodes.len()).is_some() {
            return Err(CxError::DuplicateNode(node.id));
        }
        network.nodes.push(NetworkNode {
            id: node.id,
            name: node.name,
            represents: node.represents,
            attributes: HashMap::new(),
        });
    }

    let mut edge_index: HashMap<u64, usize> = HashMap::with_capacity(aspects.edges.len());
    for edge in aspects.edges {
        for endpoint in [edge.source, edge.target] {
            if !node_index.contains_key(&endpoint) {
                return Err(CxError::DanglingEdge {
                    edge: edge.id,
                    node: endpoint,
                });
            }
        }
        if edge_index.insert(edge.id, network.edges.len()).is_some() {
            return Err(CxError::DuplicateEdge(edge.id));
        }
        network.edges.push(NetworkEdge::new(
            edge.id,
            edge.source,
            edge.target,
            edge.interaction.unwrap_or_default(),
        ));
    }

    // Attributes whose owner is unknown are dropped.
    for attr in aspects.node_attributes {
        for owner in owners(&attr.owner) {
            if let Some(&idx) = node_index.get(&owner) {
                network.nodes[idx]
                    .attributes
                    .insert(attr.name.clone(), attribute_text(&attr.value));
            }
        }
    }

    for attr in aspects.edge_attributes {
        for owner in owners(&attr.owner) {
            let Some(&idx) = edge_index.get(&owner) else {
                continue;
            };
            let edge = &mut network.edges[idx];
            if attr.name == "directed" && is_false(&attr.value) {
                edge.directed = false;
            }
            edge.attributes
                .insert(attr.name.clone(), attribute_text(&attr.value));
        }
    }

    Ok(network)
}

fn owners(owner: &PropertyOwner) -> Vec<u64> {
    match owner {
        PropertyOwner::One(id) => vec![*id],
        PropertyOwner::Many(ids) => ids.clone(),
    }
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::String(s) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}
