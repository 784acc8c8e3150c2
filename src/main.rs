//! NAHB Storage Daemon
//!
//! Serves the story graph, play sessions and statistics over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (port 5000, data in the user's local data dir)
//! NAHB_API_SECRET=change-me nahb-storage
//!
//! # Start with custom config
//! nahb-storage --config /path/to/config.toml
//!
//! # Local development without a service secret
//! nahb-storage --dev-mode --storage-dir ./data
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nahb_storage::services::events::spawn_logging_listener;
use nahb_storage::{Config, EventBus, HttpServer, ServiceAuth, Services, StoryDb};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nahb-storage")]
#[command(about = "Story data service for branching adventure stories")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "NAHB_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "NAHB_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "NAHB_HTTP_PORT")]
    http_port: Option<u16>,

    /// Shared secret required on every write
    #[arg(long, env = "NAHB_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// Accept writes without a secret
    #[arg(long, env = "NAHB_DEV_MODE")]
    dev_mode: bool,

    /// Users promoted to admin at startup (comma separated)
    #[arg(long, env = "NAHB_BOOTSTRAP_ADMINS", value_delimiter = ',')]
    bootstrap_admin: Vec<String>,

    /// Emit logs as JSON
    #[arg(long, env = "NAHB_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("nahb_storage=info".parse()?);
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(secret) = args.api_secret {
        config.api_secret = Some(secret);
    }
    if args.dev_mode {
        config.dev_mode = true;
    }
    for admin in args.bootstrap_admin {
        if !config.bootstrap_admins.contains(&admin) {
            config.bootstrap_admins.push(admin);
        }
    }

    config.validate()?;
    if config.dev_mode && config.api_secret.is_none() {
        warn!("Dev mode: writes are accepted without a service secret");
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting nahb-storage"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist; the secret stays out of the file
    let config_path = config.config_path();
    if !config_path.exists() {
        let mut on_disk = config.clone();
        on_disk.api_secret = None;
        on_disk.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(StoryDb::open(&config.storage_dir)?);
    let events = Arc::new(EventBus::with_capacity(config.event_capacity));
    let services = Arc::new(Services::new(db.clone(), events.clone()));

    services.accounts.bootstrap_admins(&config.bootstrap_admins)?;
    let listener = spawn_logging_listener(events);

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(
        db.clone(),
        services,
        ServiceAuth::from_config(&config),
        http_addr,
    ));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    // Print stats before exit
    if let Ok(stats) = db.stats() {
        info!(
            stories = stats.story_count,
            active_sessions = stats.active_sessions,
            completions = stats.completion_count,
            "Final storage stats"
        );
    }

    Ok(())
}
