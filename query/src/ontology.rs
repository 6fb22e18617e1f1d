use netpath_core::error::{ErrorCode, NetpathError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("no ontology subnetworks indexed for network {0}")]
    UnknownNetwork(String),
    #[error("ontology index is unreadable: {0}")]
    Index(String),
}

impl NetpathError for OntologyError {
    fn error_code(&self) -> ErrorCode {
        match self {
            OntologyError::UnknownNetwork(_) => ErrorCode::NotFound,
            OntologyError::Index(_) => ErrorCode::Internal,
        }
    }
}

/// Resolves the ontology subnetwork recorded for a node of a network.
pub trait OntologyLookup: Send + Sync {
    /// `Ok(Value::Null)` when the network is known but the node has no entry.
    fn subnetwork(&self, network_id: &str, node_id: &str) -> Result<Value, OntologyError>;
}

/// In-memory index shaped `{ "<network id>": { "<node id>": <value> } }`.
#[derive(Debug, Clone, Default)]
pub struct IndexedOntologyLookup {
    networks: HashMap<String, Map<String, Value>>,
}

impl IndexedOntologyLookup {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, OntologyError> {
        let root: Map<String, Value> =
            serde_json::from_slice(bytes).map_err(|err| OntologyError::Index(err.to_string()))?;

        let mut networks = HashMap::with_capacity(root.len());
        for (network_id, nodes) in root {
            match nodes {
                Value::Object(nodes) => {
                    networks.insert(network_id, nodes);
                }
                _ => {
                    return Err(OntologyError::Index(format!(
                        "entry for network {} is not an object",
                        network_id
                    )))
                }
            }
        }
        Ok(Self { networks })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OntologyError> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(|err| OntologyError::Index(err.to_string()))?;
        Self::from_json(&bytes)
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }
}

impl OntologyLookup for IndexedOntologyLookup {
    fn subnetwork(&self, network_id: &str, node_id: &str) -> Result<Value, OntologyError> {
        let nodes = self
            .networks
            .get(network_id)
            .ok_or_else(|| OntologyError::UnknownNetwork(network_id.to_string()))?;
        Ok(nodes.get(node_id).cloned().unwrap_or(Value::Null))
    }
}
