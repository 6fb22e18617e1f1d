use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{EdgeMap, Network};
use netpath_core::schedule::PreferenceSchedule;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::debug;

const DEFAULT_MAX_DEPTH: usize = 6;
const DEFAULT_MAX_EXPANSIONS: usize = 200_000;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("preference schedule cannot be used for ranking: {0}")]
    UnusableSchedule(String),
    #[error("path search failed: {0}")]
    Failed(String),
}

impl NetpathError for SearchError {
    fn error_code(&self) -> ErrorCode {
        match self {
            SearchError::UnusableSchedule(_) => ErrorCode::InvalidArgument,
            SearchError::Failed(_) => ErrorCode::Internal,
        }
    }
}

/// Inputs of one directed-path search, borrowed from the request.
#[derive(Debug, Clone, Copy)]
pub struct PathQuery<'a> {
    pub sources: &'a [String],
    pub targets: &'a [String],
    pub path_count: usize,
    pub relation_types: Option<&'a [String]>,
    pub preference_schedule: Option<&'a PreferenceSchedule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub source: String,
    pub target: String,
    pub interactions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPath {
    pub nodes: Vec<String>,
    pub steps: Vec<PathStep>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PathSet {
    pub forward: Vec<RankedPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_nodes: Vec<String>,
}

/// The path-finding collaborator.
///
/// `network` is the request's private copy and may be mutated freely;
/// `original_edge_map` describes the topology before any mutation.
pub trait PathFinder: Send + Sync {
    fn find_directed_paths(
        &self,
        network: &mut Network,
        original_edge_map: &EdgeMap,
        query: &PathQuery<'_>,
    ) -> Result<PathSet, SearchError>;
}

/// Breadth-first enumeration of simple paths, ranked by preference schedule.
#[derive(Debug, Clone)]
pub struct RankedPathFinder {
    max_depth: usize,
    max_expansions: usize,
}

impl Default for RankedPathFinder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_MAX_EXPANSIONS)
    }
}

impl RankedPathFinder {
    pub fn new(max_depth: usize, max_expansions: usize) -> Self {
        Self {
            max_depth,
            max_expansions,
        }
    }
}

impl PathFinder for RankedPathFinder {
    fn find_directed_paths(
        &self,
        network: &mut Network,
        original_edge_map: &EdgeMap,
        query: &PathQuery<'_>,
    ) -> Result<PathSet, SearchError> {
        let default_schedule;
        let schedule = match query.preference_schedule {
            Some(schedule) => schedule,
            None => {
                default_schedule = PreferenceSchedule::default();
                &default_schedule
            }
        };
        let ranks = RelationRanks::from_schedule(schedule)?;

        let allowed: Option<HashSet<&str>> = query
            .relation_types
            .map(|types| types.iter().map(String::as_str).collect());
        if let Some(allowed) = &allowed {
            network.retain_edges(|edge| allowed.contains(edge.interaction.as_str()));
        }

        let mut missing_nodes = Vec::new();
        let source_ids = resolve_names(network, query.sources, &mut missing_nodes);
        let target_ids: HashSet<u64> = resolve_names(network, query.targets, &mut missing_nodes)
            .into_iter()
            .collect();

        if query.path_count == 0 || source_ids.is_empty() || target_ids.is_empty() {
            return Ok(PathSet {
                forward: Vec::new(),
                missing_nodes,
            });
        }

        let neighbors = step_index(network);
        let walk = self.enumerate(&source_ids, &target_ids, &neighbors, query.path_count);
        if walk.exhausted_budget {
            debug!(
                queued = walk.queued,
                found = walk.paths.len(),
                "path search stopped at expansion budget"
            );
        }

        let labels: HashMap<u64, String> = network
            .nodes
            .iter()
            .map(|node| {
                let label = node.name.clone().unwrap_or_else(|| format!("#{}", node.id));
                (node.id, label)
            })
            .collect();

        let mut forward: Vec<RankedPath> = walk
            .paths
            .iter()
            .map(|path| describe(path, original_edge_map, allowed.as_ref(), &ranks, &labels))
            .collect();
        forward.sort_by(|a, b| {
            a.steps
                .len()
                .cmp(&b.steps.len())
                .then(a.score.cmp(&b.score))
                .then_with(|| a.nodes.cmp(&b.nodes))
        });
        forward.truncate(query.path_count);

        Ok(PathSet {
            forward,
            missing_nodes,
        })
    }
}

/// Outcome of one frontier walk.
#[derive(Debug, Default)]
struct Enumeration {
    paths: Vec<Vec<u64>>,
    /// Partial paths ever placed on the frontier, sources included.
    queued: usize,
    exhausted_budget: bool,
}

impl RankedPathFinder {
    /// Breadth-first walk over simple paths.
    ///
    /// Every path placed on the frontier counts against `max_expansions`, so
    /// memory stays bounded whatever the node degrees. Paths leave the queue
    /// in order of length, which allows stopping as soon as `wanted` paths
    /// are found and no path of the same length is still pending.
    fn enumerate(
        &self,
        sources: &[u64],
        targets: &HashSet<u64>,
        neighbors: &HashMap<u64, BTreeSet<u64>>,
        wanted: usize,
    ) -> Enumeration {
        let mut walk = Enumeration::default();
        let mut queue: VecDeque<Vec<u64>> = VecDeque::new();
        for &id in sources.iter().take(self.max_expansions) {
            queue.push_back(vec![id]);
            walk.queued += 1;
        }

        while let Some(path) = queue.pop_front() {
            let found_len = walk.paths.last().map(Vec::len);
            if walk.paths.len() >= wanted && found_len.is_some_and(|len| path.len() > len) {
                break;
            }

            let Some(&last) = path.last() else {
                continue;
            };
            if path.len() > 1 && targets.contains(&last) {
                walk.paths.push(path);
                continue;
            }
            if path.len() > self.max_depth {
                continue;
            }
            let Some(next) = neighbors.get(&last) else {
                continue;
            };
            for &node in next {
                if path.contains(&node) {
                    continue;
                }
                if walk.queued >= self.max_expansions {
                    walk.exhausted_budget = true;
                    break;
                }
                let mut extended = path.clone();
                extended.push(node);
                queue.push_back(extended);
                walk.queued += 1;
            }
        }
        walk
    }
}

fn resolve_names(network: &Network, names: &[String], missing: &mut Vec<String>) -> Vec<u64> {
    let mut ids = Vec::new();
    for name in names {
        let matches = network.node_ids_named(name);
        if matches.is_empty() {
            missing.push(name.clone());
        }
        ids.extend(matches);
    }
    ids
}

/// Node-level successors in the working network. Undirected edges step both ways.
fn step_index(network: &Network) -> HashMap<u64, BTreeSet<u64>> {
    let mut index: HashMap<u64, BTreeSet<u64>> = HashMap::new();
    for edge in &network.edges {
        index.entry(edge.source).or_default().insert(edge.target);
        if !edge.directed {
            index.entry(edge.target).or_default().insert(edge.source);
        }
    }
    index
}

fn describe(
    path: &[u64],
    original_edge_map: &EdgeMap,
    allowed: Option<&HashSet<&str>>,
    ranks: &RelationRanks,
    labels: &HashMap<u64, String>,
) -> RankedPath {
    let label = |id: u64| labels.get(&id).cloned().unwrap_or_else(|| format!("#{}", id));
    let permitted = |interaction: &str| allowed.map_or(true, |set| set.contains(interaction));

    let mut steps = Vec::with_capacity(path.len().saturating_sub(1));
    let mut score = 0u32;
    for pair in path.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let forward = original_edge_map.edges_between(from, to).iter();
        let backward = original_edge_map
            .edges_between(to, from)
            .iter()
            .filter(|record| !record.directed);

        let mut interactions: Vec<String> = forward
            .chain(backward)
            .filter(|record| permitted(&record.interaction))
            .map(|record| record.interaction.clone())
            .collect();
        interactions.sort();
        interactions.dedup();

        let step_rank = interactions
            .iter()
            .map(|interaction| ranks.rank(interaction))
            .min()
            .unwrap_or_else(|| ranks.unranked());
        score = score.saturating_add(step_rank);

        steps.push(PathStep {
            source: label(from),
            target: label(to),
            interactions,
        });
    }

    RankedPath {
        nodes: path.iter().map(|&id| label(id)).collect(),
        steps,
        score,
    }
}

/// Relation type -> rank, lower is preferred.
#[derive(Debug, Clone, Default)]
struct RelationRanks {
    ranks: HashMap<String, u32>,
    worst: u32,
}

impl RelationRanks {
    /// Accepts `{"1": [types], "2": [types]}` or `[[types], [types]]`.
    fn from_schedule(schedule: &PreferenceSchedule) -> Result<Self, SearchError> {
        let mut groups: Vec<(u32, &Vec<Value>)> = Vec::new();
        match schedule.as_value() {
            Value::Object(map) => {
                for (key, value) in map {
                    let rank = key.trim().parse::<u32>().map_err(|_| {
                        SearchError::UnusableSchedule(format!("rank '{}' is not a number", key))
                    })?;
                    groups.push((rank, as_type_list(key, value)?));
                }
            }
            Value::Array(items) => {
                for (idx, value) in items.iter().enumerate() {
                    let rank = u32::try_from(idx).unwrap_or(u32::MAX).saturating_add(1);
                    groups.push((rank, as_type_list(&idx.to_string(), value)?));
                }
            }
            _ => {
                return Err(SearchError::UnusableSchedule(
                    "expected an object or a list of relation-type groups".to_string(),
                ))
            }
        }

        let mut ranks = Self::default();
        for (rank, types) in groups {
            ranks.worst = ranks.worst.max(rank);
            for interaction in types.iter().filter_map(Value::as_str) {
                let entry = ranks.ranks.entry(interaction.to_string()).or_insert(rank);
                *entry = (*entry).min(rank);
            }
        }
        Ok(ranks)
    }

    fn rank(&self, interaction: &str) -> u32 {
        self.ranks
            .get(interaction)
            .copied()
            .unwrap_or_else(|| self.unranked())
    }

    /// Saturates, so a schedule using `u32::MAX` ranks stays usable.
    fn unranked(&self) -> u32 {
        self.worst.saturating_add(1)
    }
}

fn as_type_list<'a>(key: &str, value: &'a Value) -> Result<&'a Vec<Value>, SearchError> {
    value.as_array().ok_or_else(|| {
        SearchError::UnusableSchedule(format!("rank '{}' must list relation types", key))
    })
}
