//! ferry-cv - legacy data conversion service
//!
//! Serves the page-at-a-time conversion API over the ferry database in the
//! resolved root folder.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ferry_common::api::auth::load_shared_secret;
use ferry_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use ferry_common::db::{create_id_map_table, id_map_table_exists, init_database};
use ferry_cv::source::AdapterRegistry;
use ferry_cv::{build_router, AppState, DEFAULT_ROWS_PER_PAGE};

const MODULE_NAME: &str = "ferry-cv";

#[derive(Parser, Debug)]
#[command(name = "ferry-cv")]
#[command(about = "Legacy data conversion service for Ferry")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "FERRY_CV_PORT")]
    port: Option<u16>,

    /// Root folder holding ferry.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config dir>/ferry/ferry-cv.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TomlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::load_for_module(MODULE_NAME),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Ferry conversion service (ferry-cv) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml_root(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let use_lookup_table = config.use_lookup_table.unwrap_or(true);
    if use_lookup_table {
        create_id_map_table(&pool).await?;
    }
    let lookup_table = use_lookup_table && id_map_table_exists(&pool).await?;
    if !lookup_table {
        warn!("Legacy id lookups will scan metadata (lookup table disabled)");
    }

    let shared_secret = load_shared_secret(&pool).await?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("Loaded shared secret for API authentication");
    }

    let registry = AdapterRegistry::builtin().context("Invalid built-in adapter")?;
    info!("Source platforms: {}", registry.names().join(", "));

    let state = AppState::new(pool, shared_secret, registry)
        .with_lookup_table(lookup_table)
        .with_default_rows_per_page(config.default_rows_per_page.unwrap_or(DEFAULT_ROWS_PER_PAGE));
    let app = build_router(state);

    let port = args.port.or(config.port).unwrap_or(5745);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("ferry-cv listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
