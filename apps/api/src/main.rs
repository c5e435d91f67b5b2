mod cache;
mod config;
mod db;
mod detach;
mod errors;
mod llm_client;
mod metrics;
mod models;
mod repo;
mod routes;
mod state;
mod workspace;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::store::{FastStore, RedisStore};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::{AnthropicClient, LlmInvoker, DEFAULT_MODEL_KEY};
use crate::metrics::refresh::ScoreRefresher;
use crate::metrics::scoring::ScoreWeights;
use crate::metrics::visits::VisitTracker;
use crate::repo::pg::PgPromptRepo;
use crate::repo::PromptRepo;
use crate::routes::build_router;
use crate::state::AppState;
use crate::workspace::queue::{RedisTaskQueue, TaskQueue};
use crate::workspace::store::WorkspaceStore;
use crate::workspace::worker::PersistWorker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Promptmark API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    let repo: Arc<dyn PromptRepo> = Arc::new(PgPromptRepo::new(pool));

    // Initialize Redis-backed fast store and task queue
    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let fast_store: Arc<dyn FastStore> = Arc::new(RedisStore::new(redis_client.clone()));
    let queue: Arc<dyn TaskQueue> = Arc::new(RedisTaskQueue::new(redis_client));
    info!("Redis fast store initialized");

    // Initialize LLM client
    let llm: Arc<dyn LlmInvoker> = Arc::new(AnthropicClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (default model key: {DEFAULT_MODEL_KEY})");

    let workspace = WorkspaceStore::new(
        fast_store.clone(),
        Duration::from_secs(config.workspace_ttl_secs),
    );
    let visits = Arc::new(VisitTracker::new(fast_store.clone(), repo.clone()));

    // Background loops share nothing in-process; they coordinate only
    // through the fast store and the database, and all stop on the same
    // shutdown signal.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = PersistWorker::new(queue.clone(), workspace.clone(), repo.clone());
    tokio::spawn(worker.run(shutdown_rx.clone()));

    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    tokio::spawn({
        let visits = visits.clone();
        let shutdown = shutdown_rx.clone();
        async move { visits.run_flush_loop(flush_interval, shutdown).await }
    });

    let refresh_interval = Duration::from_secs(config.score_refresh_interval_secs);
    tokio::spawn({
        let refresher = ScoreRefresher::new(repo.clone(), ScoreWeights::default());
        let shutdown = shutdown_rx.clone();
        async move { refresher.run(refresh_interval, shutdown).await }
    });

    // Build app state
    let state = AppState {
        repo,
        workspace,
        queue,
        visits,
        llm,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    Ok(())
}

/// Waits for ctrl-c, then flips the shared shutdown signal so the server
/// and all background loops wind down together.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}
