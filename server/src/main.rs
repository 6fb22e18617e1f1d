use anyhow::Context;
use clap::Parser;
use netpath_core::config::AppConfig;
use netpath_core::model::NetworkId;
use netpath_server::{router, AppState};
use query::{IndexedOntologyLookup, OntologyLookup, QueryOrchestrator, RankedPathFinder};
use std::net::SocketAddr;
use std::sync::Arc;
use storage::{BlobStore, NdexClient, NetworkCache};
use tracing::{info, warn};

/// Directed-path query service over reference biological networks.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Listen port; overrides the configured `server.port`.
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    netpath_core::init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::load().context("loading configuration")?;
    let port = cli.port.unwrap_or(config.server.port);

    let blobs = BlobStore::new(&config.storage.blob_dir).with_io_timeout(config.storage.io_timeout());
    let remote = NdexClient::new(config.remote.fetch_timeout()).context("building NDEx client")?;
    let cache = NetworkCache::with_fetch_timeout(blobs, Arc::new(remote), config.remote.fetch_timeout());
    let finder = RankedPathFinder::new(config.search.max_depth, config.search.max_expansions);
    let orchestrator = QueryOrchestrator::new(cache.clone(), Arc::new(finder));

    let ontology: Arc<dyn OntologyLookup> = match &config.ontology.index_path {
        Some(path) => Arc::new(
            IndexedOntologyLookup::load(path)
                .await
                .with_context(|| format!("loading ontology index {}", path))?,
        ),
        None => Arc::new(IndexedOntologyLookup::empty()),
    };

    for network in &config.remote.preload {
        let id = NetworkId::new(network.id.as_str());
        match cache.resolve(&id, &network.host).await {
            Ok(resolved) => info!(
                network_id = %id,
                nodes = resolved.network.node_count(),
                "preloaded reference network"
            ),
            Err(err) => warn!(network_id = %id, error = %err, "could not preload reference network"),
        }
    }

    let state = AppState::new(orchestrator, ontology).with_max_upload_bytes(config.server.max_upload_bytes);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "netpath server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("netpath server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
