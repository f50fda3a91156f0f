//! Scrape endpoint for Prometheus.
//!
//! One route, one injected renderer. The caller decides whether to run it at
//! all (port 0 means no endpoint) and what text each scrape returns, so this
//! module stays free of any metrics wiring of its own.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

/// Serve `GET /metrics` on `0.0.0.0:port`, calling `render` on every scrape.
/// Long-running; spawn it as its own task.
pub async fn serve_metrics(port: u16, render: fn() -> String) {
    let app = Router::new().route("/metrics", get(move || async move { render() }));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Could not bind the metrics endpoint");
            return;
        }
    };
    info!(%addr, "Metrics endpoint listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Metrics endpoint failed");
    }
}
