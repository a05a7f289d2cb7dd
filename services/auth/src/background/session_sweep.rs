//! Periodic removal of expired session rows.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::infra::db::DbSessionRepository;
use crate::usecase::session::SessionService;

/// Run the sweep loop until `cancel` fires. Each tick is a single
/// delete-where-expired, so concurrent instances are harmless.
pub async fn run(
    service: SessionService<DbSessionRepository>,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = every.as_secs(), "session sweep started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("session sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match service.cleanup_expired_sessions().await {
                    Ok(0) => tracing::debug!("session sweep: nothing expired"),
                    Ok(deleted) => tracing::info!(deleted, "session sweep: purged expired sessions"),
                    Err(e) => tracing::error!(error = ?e, "session sweep failed"),
                }
            }
        }
    }
}
