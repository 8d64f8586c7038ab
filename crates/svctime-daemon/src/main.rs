//! svctime-daemon - service time tracking server
//!
//! Serves one protocol generation over HTTP and WebSocket. Configuration is
//! layered: built-in defaults, then the TOML file, then command-line flags
//! and their environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use svctime_core::{ApiVersion, Backend, ServiceConfig};
use svctime_daemon::{AppState, router};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// svctime daemon - tracks elapsed time for named services
#[derive(Parser, Debug)]
#[command(name = "svctime-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (ignored if missing)
    #[arg(short, long, env = "SVCTIME_CONFIG", default_value = "svctime.toml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "SVCTIME_BIND")]
    bind: Option<String>,

    /// Protocol generation to serve (v1 or v2)
    #[arg(long, env = "FT_VERSION")]
    api_version: Option<ApiVersion>,

    /// Accepted username
    #[arg(long, env = "FT_USERNAME")]
    username: Option<String>,

    /// Accepted password
    #[arg(long, env = "FT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Store backend (sqlite, file or memory)
    #[arg(long, env = "SVCTIME_BACKEND")]
    backend: Option<Backend>,

    /// Database or snapshot file path
    #[arg(long, env = "FT_DB")]
    db: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or an `EnvFilter` directive)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Loads the config file if present and applies flag overrides.
    fn load_config(&self) -> Result<ServiceConfig> {
        let mut config = if self.config.exists() {
            ServiceConfig::from_file(&self.config).with_context(|| {
                format!("failed to load configuration from {}", self.config.display())
            })?
        } else {
            ServiceConfig::default()
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind.clone_from(bind);
        }
        if let Some(version) = self.api_version {
            config.server.api_version = version;
        }
        if let Some(username) = &self.username {
            config.auth.username.clone_from(username);
        }
        if let Some(password) = &self.password {
            config.auth.password.clone_from(password);
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(db) = &self.db {
            config.storage.path.clone_from(db);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

/// Synchronous entry point: parse arguments, then start the runtime.
fn main() -> Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    init_logging(&args)?;

    let config = args.load_config()?;
    info!(
        api_version = %config.server.api_version,
        backend = %config.storage.backend,
        "starting svctime-daemon"
    );

    let store = config.open_store().with_context(|| {
        format!(
            "failed to open {} store at {}",
            config.storage.backend,
            config.storage.path.display()
        )
    })?;
    let state = AppState::new(
        store,
        config.credentials(),
        config.server.api_version,
    );
    let app = router(state);

    let bind = (config.server.bind.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}:{}", bind.0, bind.1))?;
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(addr = %addr, prefix = config.server.api_version.prefix(), "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("svctime-daemon stopped");
    Ok(())
}

/// Resolves on the first SIGTERM or SIGINT.
async fn shutdown_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "failed to register signal handlers; running until killed");
            std::future::pending::<()>().await;
            return;
        },
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }
}
