//! greengridd: the GreenGrid daemon.
//!
//! Single binary that assembles all GreenGrid subsystems:
//! - Job store (redb)
//! - Intensity source (WattTime, with fallbacks)
//! - Scheduler runtime (dispatch + savings accounting)
//! - Intensity sampler (dashboard history)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! greengridd serve --port 8000 --data-dir /var/lib/greengrid --config greengrid.toml
//! greengridd check-config --config greengrid.toml
//! ```
//!
//! WattTime credentials are read from `WATTTIME_USERNAME` and
//! `WATTTIME_PASSWORD`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use greengrid_core::GreenGridConfig;
use greengrid_dispatch::{RequeueMode, SchedulerRuntime};
use greengrid_intensity::{Credentials, IntensitySampler, IntensitySource, WattTimeSource};
use greengrid_state::JobStore;

const DEFAULT_LOG_FILTER: &str = "info,greengridd=debug,greengrid=debug";

#[derive(Parser)]
#[command(name = "greengridd", about = "GreenGrid carbon-aware scheduler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and API server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/greengrid")]
        data_dir: PathBuf,

        /// Configuration file. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log output format.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,
    },
    /// Validate a configuration file and print the effective settings.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            config,
            log_format,
        } => {
            init_tracing(log_format);
            let config = load_config(config.as_deref())?;
            run_serve(port, data_dir, config).await
        }
        Command::CheckConfig { config } => {
            let config = GreenGridConfig::from_file(&config)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GreenGridConfig> {
    match path {
        Some(path) => {
            let config = GreenGridConfig::from_file(path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => {
            info!("no configuration file given, using defaults");
            Ok(GreenGridConfig::default())
        }
    }
}

async fn run_serve(port: u16, data_dir: PathBuf, config: GreenGridConfig) -> anyhow::Result<()> {
    info!("GreenGrid daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("greengrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // Job store.
    let store = JobStore::open(&db_path)?;
    info!(path = ?db_path, "job store opened");

    // Intensity source.
    let credentials = Credentials::from_env();
    if credentials.is_none() {
        warn!("WattTime credentials not set, serving fallback readings");
    }
    let watttime = WattTimeSource::new(&config.intensity, credentials)?;
    let source: Arc<dyn IntensitySource> = Arc::new(watttime);
    info!(base_url = %config.intensity.base_url, "intensity source initialized");

    // Scheduler runtime.
    let runtime = Arc::new(SchedulerRuntime::new(
        &config,
        store.clone(),
        Arc::clone(&source),
        RequeueMode::Enabled,
    ));
    info!(workers = config.runtime.workers, "scheduler runtime initialized");

    // Intensity sampler.
    let sampler = IntensitySampler::new(
        store.clone(),
        Arc::clone(&source),
        config.regions.catalog(),
        config.intensity.sample_interval(),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_shutdown = shutdown_rx.clone();
    let sampler_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let scheduler_handle = tokio::spawn(Arc::clone(&runtime).run(scheduler_shutdown));
    let sampler_handle = tokio::spawn(async move {
        sampler.run(sampler_shutdown).await;
    });

    // Pick up jobs left unfinished by the last run.
    runtime.resume().await?;

    // ── Start API server ───────────────────────────────────────

    let router = greengrid_api::build_router(greengrid_api::ApiState {
        store,
        scheduler: runtime.handle(),
        source,
        config: Arc::new(config),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = scheduler_handle.await;
    let _ = sampler_handle.await;

    info!("GreenGrid daemon stopped");
    Ok(())
}
