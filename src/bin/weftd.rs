//! weft HTTP server.
//!
//! - `POST /api/{concept}/{op}` — concept routes (passthrough or cascade)
//! - `GET  /health` — server status
//!
//! Build and run: `cargo run --features server --bin weftd`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::IntoDiagnostic;

use weft::concept::ConceptRegistry;
use weft::concepts::{Dictionary, FileTracker, Library, PasswordAuthentication, Sessioning};
use weft::config::WeftConfig;
use weft::engine::Engine;
use weft::estimate::{HeuristicCompletion, IndexEstimator};
use weft::requesting::Requesting;
use weft::server::{router, AppState};
use weft::syncs;

#[derive(Parser)]
#[command(name = "weftd", version, about = "weft concept server")]
struct Args {
    /// Path to a TOML config file. Defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => WeftConfig::load(path)?,
        None => WeftConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let estimator = Arc::new(IndexEstimator::new(Arc::new(HeuristicCompletion)));
    let registry = ConceptRegistry::new();
    registry.register(Arc::new(Requesting::new()))?;
    registry.register(Arc::new(PasswordAuthentication::new()))?;
    registry.register(Arc::new(Sessioning::new()))?;
    registry.register(Arc::new(Library::new()))?;
    registry.register(Arc::new(FileTracker::new(estimator)))?;
    registry.register(Arc::new(Dictionary::new()))?;

    let engine = Engine::new(registry, syncs::all(), config.max_depth)?;
    let listen = config.listen.clone();
    let state = Arc::new(AppState { engine, config });

    let app = router(state);

    tracing::info!("weftd listening on {listen}");
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}
