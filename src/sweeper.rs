//! Periodic hard-delete of refresh rows long past their expiry.

use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::db::store::{RefreshTokenStore, StoreProvider};
use crate::error::AppError;

/// Deletes rows whose own expiry is older than `retention`. Returns how many went.
pub fn sweep_once(
    store: &dyn StoreProvider,
    clock: &dyn Clock,
    retention: Duration,
) -> Result<usize, AppError> {
    let cutoff = clock.now().checked_sub_signed(retention).ok_or_else(|| {
        AppError::Configuration(format!("retention {retention} reaches before the clock's range"))
    })?;
    let mut session = store.open()?;
    let purged = session.purge_expired_before(cutoff)?;
    tracing::info!(purged, %cutoff, "Refresh token retention sweep finished");
    Ok(purged)
}

/// Runs `sweep_once` every `interval` on a blocking thread. Failures are logged only.
pub fn spawn_retention_sweep(
    store: Arc<dyn StoreProvider>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let store = Arc::clone(&store);
            let clock = Arc::clone(&clock);
            let result = tokio::task::spawn_blocking(move || {
                sweep_once(store.as_ref(), clock.as_ref(), retention)
            })
            .await;

            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Retention sweep failed: {e}"),
                Err(e) => tracing::error!("Retention sweep task panicked: {e}"),
            }
        }
    })
}
