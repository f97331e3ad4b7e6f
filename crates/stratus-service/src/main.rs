//! Stratus Service - forecast sync worker and HTTP API.
//!
//! Run with: `cargo run -p stratus-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stratus_core::WeatherApiClient;
use stratus_service::{AppState, Config, MemoryCache, SyncError, SyncRequest};
use stratus_store::Store;

/// Stratus Service - forecast sync worker and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "stratus-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config and environment).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config and environment).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the API and run the periodic worker (default).
    Serve {
        /// Disable the background worker (API only mode).
        #[arg(long)]
        no_worker: bool,
    },

    /// Run only the periodic worker.
    Worker,

    /// Sync once and exit.
    Sync {
        /// Only this location.
        #[arg(long)]
        location_id: Option<i64>,

        /// Maximum locations to sync.
        #[arg(long, default_value_t = 10)]
        limit: u32,

        /// Days of forecast to request.
        #[arg(long, default_value_t = 14)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stratus_service=info".parse()?)
                .add_directive("stratus_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;
    let (state, cache) = build_state(config).await?;

    tokio::spawn(stratus_service::cancel_on_signal(
        tokio::signal::ctrl_c(),
        state.shutdown.clone(),
    ));

    match args.command {
        Some(Command::Serve { no_worker }) => run_server(state, cache, no_worker).await,
        None => run_server(state, cache, false).await,
        Some(Command::Worker) => {
            let worker = state.worker().await;
            worker.run(state.shutdown.clone()).await;
            Ok(())
        }
        Some(Command::Sync {
            location_id,
            limit,
            days,
        }) => {
            let request = SyncRequest {
                location_id,
                limit,
                forecast_days: days,
            };
            run_sync_once(&state, &request).await
        }
    }
}

/// File (or defaults), then environment, then CLI flags.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env()?;

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    if config.provider.api_key.is_empty() {
        warn!("No WeatherAPI key configured; syncs will be rejected by the provider");
    }
    Ok(config)
}

async fn build_state(config: Config) -> anyhow::Result<(Arc<AppState>, Arc<MemoryCache>)> {
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let client = WeatherApiClient::new(
        &config.provider.base_url,
        config.provider.api_key.clone(),
        config.provider.timeout(),
        config.backoff.policy(),
    )?;

    let cache = Arc::new(MemoryCache::new());
    let state = AppState::new(store, config, Arc::new(client), cache.clone());
    Ok((state, cache))
}

async fn run_server(
    state: Arc<AppState>,
    cache: Arc<MemoryCache>,
    no_worker: bool,
) -> anyhow::Result<()> {
    let (addr, worker_enabled, ttl) = {
        let config = state.config.read().await;
        let addr: SocketAddr = config.server.bind.parse()?;
        (addr, config.worker.enabled && !no_worker, config.cache.ttl())
    };

    if worker_enabled {
        let worker = state.worker().await;
        let cancel = state.shutdown.clone();
        tokio::spawn(async move { worker.run(cancel).await });
    } else {
        info!("Background worker disabled");
    }

    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    cache.purge_expired().await;
                }
            }
        }
    });

    let shutdown = state.shutdown.clone();
    let app = stratus_service::app(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn run_sync_once(state: &AppState, request: &SyncRequest) -> anyhow::Result<()> {
    let cancel: CancellationToken = state.shutdown.child_token();
    match state.sync.sync_weather(request, &cancel).await {
        Ok(report) => {
            println!(
                "Synced {}/{} locations ({} records)",
                report.synced, report.locations, report.records
            );
            Ok(())
        }
        Err(SyncError::Partial { failures, report }) => {
            println!(
                "Synced {}/{} locations ({} records)",
                report.synced, report.locations, report.records
            );
            for failure in &failures {
                eprintln!("  failed: {}", failure);
            }
            anyhow::bail!("{} location(s) failed to sync", failures.len())
        }
        Err(e) => Err(e.into()),
    }
}
