// Conference draft server entry point.
//
// Startup sequence:
// 1. Load config (copying defaults on first run)
// 2. Initialize tracing (log to file)
// 3. Open database
// 4. Load the resource catalog
// 5. Create the event channel
// 6. Spawn WebSocket server task
// 7. Spawn app task
// 8. Wait for Ctrl+C, then shut down

use std::path::Path;

use anyhow::Context;
use confdraft_core::catalog::Catalog;
use confdraft_core::config::{self, LoggingConfig};
use confdraft_core::db;
use confdraft_core::draft::DraftEngine;
use confdraft_server::{app, ws_server};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;
    info!("Conference draft server starting up");
    info!(
        "Config loaded: pick limit {}, group capacity {}, port {}",
        config.rules.default_pick_limit, config.rules.group_capacity, config.server.port
    );

    // 3. Open database
    let db = db::Database::open_with_timeout(&config.db_path, config.busy_timeout)
        .context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Load the catalog
    let catalog = load_catalog(&config.catalog_path)?;
    info!(
        "Loaded {} resources from {}",
        catalog.len(),
        config.catalog_path.display()
    );

    let port = config.server.port;
    let engine = DraftEngine::new(db, catalog, config.rules.clone());
    let app_state = app::AppState::new(engine, config.server);

    // 5. Create the event channel
    let (ws_tx, ws_rx) = mpsc::channel(256);

    // 6. Spawn WebSocket server task
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(port, ws_tx).await {
            error!("WebSocket server error on port {}: {}", port, e);
        }
    });

    // 7. Spawn app task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Server ready. WebSocket endpoint on 127.0.0.1:{}", port);

    // 8. Run until Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Ctrl+C received, shutting down");

    // The server task holds the only sender; aborting it lets the app task
    // drain and exit.
    ws_handle.abort();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Conference draft server shut down cleanly");
    Ok(())
}

fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let catalog = Catalog::from_json(&text)
        .with_context(|| format!("failed to parse catalog {}", path.display()))?;
    anyhow::ensure!(!catalog.is_empty(), "catalog {} is empty", path.display());
    Ok(catalog)
}

/// Initialize tracing to log to a file under the configured directory.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join(&logging.directory);
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("confdraft.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
