//! wavecalld - wave-dispatch volunteer matching daemon.
//!
//! Thin assembly: tracing, config, database, platform client, engine, and
//! the background tasks around the long-poll intake loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wavecall::platform::{BotApiClient, poll};
use wavecall::{Config, Database, Router, Switchboard, config, dispatch, http, metrics, rooms};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let cfg = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(problems) = config::validate(&cfg) {
        for problem in &problems {
            error!("Config error: {problem}");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with invalid configuration ({} problem(s))",
            problems.len()
        ));
    }

    info!(api_url = %cfg.bot.api_url, db = %cfg.database.path, "Starting wavecalld");

    // Initialize metrics registry
    metrics::init();

    let db = Database::new(&cfg.database.path).await?;

    let client = BotApiClient::new(
        &cfg.bot.api_url,
        &cfg.bot.token,
        Duration::from_secs(cfg.bot.http_timeout_secs),
    )?;

    let switchboard = Arc::new(Switchboard::new(
        db,
        Arc::new(client.clone()),
        Arc::new(client.clone()),
        None,
        cfg.dispatch.clone(),
    ));

    // Populate the room pool before anything can be accepted
    if let Err(e) = switchboard.reconcile_rooms().await {
        error!(error = %e, "Initial room reconciliation failed");
    }

    // Background tasks
    tokio::spawn(dispatch::run_wave_timer(Arc::clone(&switchboard)));
    tokio::spawn(dispatch::run_state_purge(Arc::clone(&switchboard)));
    if cfg.rooms.reconcile_interval_secs > 0 {
        tokio::spawn(rooms::run_room_reconciler(
            Arc::clone(&switchboard),
            cfg.rooms.reconcile_interval_secs,
        ));
    }
    if cfg.server.metrics_port > 0 {
        tokio::spawn(http::serve_metrics(
            cfg.server.metrics_port,
            metrics::gather_metrics,
        ));
    }

    // Long-poll intake loop: runs until the process is killed
    let router = Arc::new(Router::new(Arc::clone(&switchboard)));
    poll::run(client, router, cfg.bot.poll_timeout_secs).await;

    Ok(())
}
