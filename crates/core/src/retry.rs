//! Backoff policy for contended compare-and-swap writes.

use std::time::Duration;

use rand::Rng;
use sprintdeck_common::config::StoreConfig;
use sprintdeck_common::{AppError, AppResult};
use tracing::{debug, warn};

/// Exponential backoff with jitter between compare-and-swap attempts.
#[derive(Debug, Clone)]
pub struct CasPolicy {
    /// Total attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for CasPolicy {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for CasPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_attempts: config.max_cas_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            multiplier: 2.0,
        }
    }
}

impl CasPolicy {
    /// Delay after the given failed attempt (0-indexed), before jitter.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = (initial_ms * self.multiplier.powi(attempt as i32)).round();
        let max_ms = self.max_delay.as_millis() as f64;

        if delay_ms > max_ms {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// Delay with full jitter: uniform in `[0, delay_for_attempt]`.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.delay_for_attempt(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Sleep before the next attempt after `lost` lost races on `doc_id`.
    ///
    /// Fails with [`AppError::TransientStore`] once the attempts are spent.
    pub async fn wait_after_lost_race(&self, lost: u32, doc_id: &str) -> AppResult<()> {
        if !self.should_retry(lost) {
            warn!(doc_id = %doc_id, attempts = lost, "Write contention not resolved; giving up");
            return Err(AppError::TransientStore(format!(
                "too much write contention on {doc_id}"
            )));
        }
        let delay = self.jittered_delay(lost.saturating_sub(1));
        debug!(doc_id = %doc_id, attempt = lost, delay_ms = delay.as_millis() as u64, "Lost write race; retrying");
        tokio::time::sleep(delay).await;
        Ok(())
    }
}
