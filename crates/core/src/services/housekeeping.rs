//! Periodic maintenance.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::services::session::SessionService;

/// Spawn the stale-participant sweep.
///
/// Runs every `every` until the task is aborted. A failed pass is logged
/// and the next tick tries again.
pub fn spawn_participant_sweep(sessions: SessionService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(every);
        loop {
            interval.tick().await;
            match sessions.sweep_stale_participants().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Marked stale participants offline");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Stale participant sweep failed");
                }
            }
        }
    })
}
