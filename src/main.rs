//! `contextd` binary entry point (§13). `contextd serve` (also the
//! no-arguments default) starts the HTTP daemon; `contextd stdio
//! [--daemon-url <url>]` starts the short-lived stdio↔HTTP bridge process
//! instead (§4.6.2) — the same binary serves both transports, selected by
//! the first argument rather than a second `[[bin]]` target, since the
//! bridge has no dependencies the daemon lacks. Flag parsing is
//! `std::env::args`-based only; no `clap` dependency is introduced, since
//! the spec puts a general CLI framework out of scope.

use contextd::auth::AuthService;
use contextd::embed::{Embedder, HashEmbedder};
use contextd::services::{CheckpointService, RemediationService, TroubleshootingService};
use contextd::state::AppState;
use contextd::store::{InMemoryStore, Store};
use contextd::{config, http, logging, mcp, prefetch};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match std::env::args().nth(1).as_deref() {
        Some("stdio") => run_bridge().await,
        Some("serve") | None => run_daemon().await,
        Some(other) => {
            eprintln!("contextd: unrecognized subcommand {other:?} (expected \"serve\" or \"stdio\")");
            std::process::exit(2);
        }
    }
}

/// Starts the stdio↔HTTP bridge: `contextd stdio [--daemon-url <url>]`.
/// Logs go to stderr so stdout stays a clean JSON-RPC stream for the caller.
async fn run_bridge() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    let daemon_url = args
        .iter()
        .position(|a| a == "--daemon-url")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| std::env::var("CONTEXTD_DAEMON_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:7420".to_string());

    tracing::info!(daemon_url = %daemon_url, "starting stdio bridge");
    let config = mcp::stdio::BridgeConfig::from_env(daemon_url);
    mcp::stdio::run(config).await?;
    Ok(())
}

async fn run_daemon() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env for secrets (CONTEXTD_JWT_SECRET, etc.) before anything reads them.
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;
    logging::init(config.logging.format);

    tracing::info!("starting contextd");

    // =================================================================
    // Embedder
    // =================================================================
    let embedder: Arc<dyn Embedder> = build_embedder(&config)?;

    // =================================================================
    // Store
    // =================================================================
    let store: Arc<dyn Store> = build_store(&config, embedder).await?;

    // =================================================================
    // Services + shared state
    // =================================================================
    let auth_service = Arc::new(AuthService::new(config.auth.jwt_secret.clone()));

    let prefetch_config = prefetch::Config {
        enabled: config.prefetch.enabled,
        max_parallel: config.prefetch.max_parallel,
        timeout: Duration::from_millis(config.prefetch.timeout_ms),
        ..prefetch::Config::default()
    };

    let state = AppState {
        checkpoint: Arc::new(CheckpointService::new(store.clone())),
        remediation: Arc::new(RemediationService::new(store.clone())),
        troubleshooting: Arc::new(TroubleshootingService::new(store)),
        prefetch_config: Some(prefetch_config),
        started_at: Instant::now(),
    };

    // =================================================================
    // Router + serve
    // =================================================================
    let app = http::build_router(state, auth_service);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "contextd listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_embedder(config: &config::Config) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    match config.embedder.kind {
        config::EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::new(config.embedder.dimensions))),
        #[cfg(feature = "local-embeddings")]
        config::EmbedderKind::Fastembed => {
            let embedder = contextd::embed::FastEmbedEmbedder::try_new()
                .map_err(|e| format!("failed to initialize fastembed embedder: {e}"))?;
            Ok(Arc::new(embedder))
        }
    }
}

async fn build_store(config: &config::Config, embedder: Arc<dyn Embedder>) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store.backend {
        config::VectorBackend::Memory => {
            tracing::info!("vector store backend: memory");
            Ok(Arc::new(InMemoryStore::new(embedder)))
        }
        #[cfg(feature = "local-vector")]
        config::VectorBackend::Local => {
            tracing::info!(data_dir = ?config.store.data_dir, "vector store backend: local");
            let store = contextd::store::LocalStore::open(config.store.data_dir.as_deref(), embedder).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "local-vector"))]
        config::VectorBackend::Local => {
            Err("store.backend = \"local\" requires the `local-vector` feature".into())
        }
        config::VectorBackend::Grpc => {
            // No generated gRPC client ships with this daemon (`GrpcStore`
            // is generic over `VectorBackendClient`, exercised in tests via
            // `LoopbackClient`); a real deployment wires its own client in
            // before this match arm can be made to work.
            Err(format!(
                "store.backend = \"grpc\" has no compiled-in client for endpoint {:?}; wire a VectorBackendClient implementation to enable it",
                config.store.grpc_endpoint
            )
            .into())
        }
    }
}
