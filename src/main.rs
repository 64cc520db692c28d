//! Partner Academy Daemon
//!
//! Serves partner learning progress over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! partner-academy
//!
//! # Start with custom config
//! partner-academy --config /path/to/config.toml
//!
//! # Import a course catalog at startup
//! partner-academy --catalog ./courses.json
//!
//! # Custom port and storage directory
//! partner-academy --http-port 9000 --storage-dir /data/academy
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use partner_academy::services::events::spawn_logging_listener;
use partner_academy::{Config, DbOptions, EngineSettings, HttpServer, LearningDb, Services, SqliteCatalog};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "partner-academy")]
#[command(about = "Partner learning and certification progression service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "ACADEMY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "ACADEMY_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "ACADEMY_HTTP_PORT")]
    http_port: Option<u16>,

    /// Course catalog JSON to import at startup
    #[arg(long, env = "ACADEMY_CATALOG")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("partner_academy=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let default_path = Config::default().config_path();
            if default_path.exists() {
                Config::load(&default_path)
                    .with_context(|| format!("Failed to load config from {}", default_path.display()))?
            } else {
                Config::default()
            }
        }
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(catalog) = args.catalog {
        config.catalog_path = Some(catalog);
    }
    config.validate()?;

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting partner-academy"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.storage_dir.display()))?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    // Open database
    let db = Arc::new(
        LearningDb::open(
            &config.database_path(),
            DbOptions {
                pool_size: config.db_pool_size,
                busy_timeout_ms: config.busy_timeout_ms,
            },
        )
        .context("Failed to open database")?,
    );

    let catalog = Arc::new(SqliteCatalog::new(db.clone()));

    // Import catalog
    if let Some(path) = &config.catalog_path {
        let result = catalog
            .import_file(path)
            .with_context(|| format!("Failed to import catalog {}", path.display()))?;
        info!(
            imported = result.imported,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Catalog import finished"
        );
        for error in &result.errors {
            warn!(error = %error, "Course rejected");
        }
    }

    let services = Arc::new(Services::new(db, catalog, EngineSettings::from(&config)));
    let _listener = spawn_logging_listener(services.events.clone());

    // Start HTTP server
    let http_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
        .parse()
        .context("Invalid bind address")?;
    let server = Arc::new(HttpServer::new(services, http_addr));

    info!("HTTP API available at http://{}", http_addr);

    tokio::select! {
        result = server.run() => {
            result.context("HTTP server stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
