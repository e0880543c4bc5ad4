use anyhow::Context;
use clap::Parser;
use kvshard::config::{Cli, Command, NodeArgs, RouterArgs};
use kvshard::routing::client::NodeClient;
use kvshard::routing::forwarder::Forwarder;
use kvshard::routing::handlers::{self as router_handlers, RouterState};
use kvshard::routing::listing::ListingAggregator;
use kvshard::routing::ring::PartitionRing;
use kvshard::storage::handlers::{self as node_handlers, NodeState};
use kvshard::storage::memory::VersionedStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let shutdown = CancellationToken::new();

    match cli.command {
        Command::Node(args) => run_node(args, shutdown).await,
        Command::Router(args) => run_router(args, shutdown).await,
    }
}

async fn run_node(args: NodeArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    tracing::info!("Starting storage node on {}", args.bind);

    let app = node_handlers::router(NodeState {
        store: Arc::new(VersionedStore::new()),
        shutdown: shutdown.clone(),
    });

    serve(args.bind, app, shutdown).await
}

async fn run_router(args: RouterArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    tracing::info!("Starting router on {}", args.bind);

    let request_timeout = args.request_timeout();

    // 1. Topology and ring. Both are fatal when misconfigured:
    let topology = Arc::new(args.build_topology().context("invalid node topology")?);
    let ring = Arc::new(PartitionRing::new(&topology).context("cannot build hash ring")?);

    // 2. Shard client shared by forwarding and listing:
    let client = NodeClient::new(request_timeout).context("cannot build HTTP client")?;

    // 3. HTTP Router:
    let app = router_handlers::router(RouterState {
        forwarder: Arc::new(Forwarder::new(ring, client.clone())),
        listing: Arc::new(ListingAggregator::new(topology, client)),
        shutdown: shutdown.clone(),
    });

    serve(args.bind, app, shutdown).await
}

async fn serve(
    bind: SocketAddr,
    app: axum::Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {}", bind))?;

    tracing::info!("HTTP server listening on {}", bind);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
