use crate::request::{NetworkSource, QueryRequest, RawQueryParameters, RequestValidator, ValidationError};
use crate::search::{PathFinder, PathQuery, PathSet, SearchError};
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{EdgeMap, Network};
use std::sync::Arc;
use std::time::Instant;
use storage::{CacheError, NetworkCache, ResolvedNetwork};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("path search was aborted before completing")]
    SearchAborted,
}

impl NetpathError for OrchestrationError {
    fn error_code(&self) -> ErrorCode {
        match self {
            OrchestrationError::Cache(err) => err.error_code(),
            OrchestrationError::Search(err) => err.error_code(),
            OrchestrationError::SearchAborted => ErrorCode::Internal,
        }
    }
}

/// Any failure of one query, from raw input to path result.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

impl NetpathError for QueryError {
    fn error_code(&self) -> ErrorCode {
        match self {
            QueryError::Validation(err) => err.error_code(),
            QueryError::Orchestration(err) => err.error_code(),
        }
    }
}

/// Resolves the network a query names and hands it to the path finder.
///
/// Holds no per-request state; clones share the same cache and finder.
#[derive(Clone)]
pub struct QueryOrchestrator {
    validator: RequestValidator,
    cache: NetworkCache,
    finder: Arc<dyn PathFinder>,
}

impl QueryOrchestrator {
    pub fn new(cache: NetworkCache, finder: Arc<dyn PathFinder>) -> Self {
        Self {
            validator: RequestValidator::default(),
            cache,
            finder,
        }
    }

    pub fn cache(&self) -> &NetworkCache {
        &self.cache
    }

    /// Validate raw request data, then run it.
    pub async fn execute(
        &self,
        params: &RawQueryParameters,
        uploaded_network: Option<&[u8]>,
        uploaded_schedule: Option<&[u8]>,
    ) -> Result<PathSet, QueryError> {
        let request = self
            .validator
            .validate(params, uploaded_network, uploaded_schedule)
            .map_err(|err| {
                debug!(error = %err, "rejected query");
                err
            })?;
        Ok(self.handle(request).await?)
    }

    pub async fn handle(&self, request: QueryRequest) -> Result<PathSet, OrchestrationError> {
        let started = Instant::now();
        let QueryRequest {
            network,
            sources,
            targets,
            path_count,
            relation_types,
            preference_schedule,
        } = request;

        let ResolvedNetwork {
            network,
            original_edge_map,
        } = match network {
            NetworkSource::ByIdentifier { id, host } => self.cache.resolve(&id, &host).await?,
            NetworkSource::ByUpload { network } => {
                debug!(nodes = network.node_count(), "using uploaded network");
                let original_edge_map = network.edge_map();
                ResolvedNetwork {
                    network,
                    original_edge_map,
                }
            }
        };

        // The search is CPU bound and may walk a large graph.
        let finder = Arc::clone(&self.finder);
        let paths = tokio::task::spawn_blocking(move || {
            run_search(
                finder.as_ref(),
                network,
                &original_edge_map,
                &PathQuery {
                    sources: &sources,
                    targets: &targets,
                    path_count,
                    relation_types: relation_types.as_deref(),
                    preference_schedule: preference_schedule.as_ref(),
                },
            )
        })
        .await
        .map_err(|_| OrchestrationError::SearchAborted)??;

        info!(
            paths = paths.forward.len(),
            missing = paths.missing_nodes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "directed path query complete"
        );
        Ok(paths)
    }
}

fn run_search(
    finder: &dyn PathFinder,
    mut network: Network,
    original_edge_map: &EdgeMap,
    query: &PathQuery<'_>,
) -> Result<PathSet, SearchError> {
    finder.find_directed_paths(&mut network, original_edge_map, query)
}
