//! Long-poll intake loop.
//!
//! Pulls update batches from the Bot API and hands each update to the
//! router. Deliberately thin: no business logic lives here. Poll errors are
//! counted and backed off; the loop never dies on a bad batch.

use super::BotApiClient;
use crate::router::Router;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Run the intake loop until the process exits.
pub async fn run(client: BotApiClient, router: Arc<Router>, poll_timeout_secs: u64) {
    let mut marker: Option<i64> = None;
    let mut consecutive_errors: u32 = 0;

    info!("Long-poll intake loop started");

    loop {
        match client.get_updates(marker, poll_timeout_secs).await {
            Ok(batch) => {
                consecutive_errors = 0;
                for update in &batch.updates {
                    // One bad update must not take down the batch
                    if let Err(e) = router.route(update).await {
                        error!(error = %e, code = e.error_code(), "Update handling failed");
                    }
                }
                if batch.marker.is_some() {
                    marker = batch.marker;
                }
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let backoff = Duration::from_secs(2u64.pow(consecutive_errors.min(5)));
                warn!(
                    error = %e,
                    consecutive_errors,
                    backoff_secs = backoff.as_secs(),
                    "Long-poll failed, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
