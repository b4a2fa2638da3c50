//! Process-wide pacing for outbound requests.
//!
//! Every network call in the pipeline (link resolution, tier-1 fetches,
//! crawl-policy fetches, enrichment calls, discovery) first waits on the one
//! shared [`Pacer`]. The remote quota is shared across the whole run, so the
//! pacer is a single owned component handed to each stage behind an `Arc`,
//! not per-country state.
//!
//! The wait between consecutive calls is:
//!
//! ```text
//! delay = min_delay + random_jitter(0..=jitter)
//! ```

use rand::{Rng, rng};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument};

/// Shared rate limiter enforcing a minimum spacing between outbound calls.
///
/// The time of the last request is the only mutable state. Callers hold the
/// lock while sleeping, so concurrent callers are served strictly one after
/// another even if countries are later processed in parallel.
#[derive(Debug)]
pub struct Pacer {
    min_delay: Duration,
    jitter: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_delay: Duration, jitter: Duration) -> Self {
        Self {
            min_delay,
            jitter,
            last_request: Mutex::new(None),
        }
    }

    /// A pacer that never waits.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn next_gap(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.min_delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=self.jitter.as_millis() as u64);
        self.min_delay + Duration::from_millis(jitter_ms)
    }

    /// Wait until this caller may issue its next outbound request.
    ///
    /// The first call never waits. Each later call waits until the configured
    /// gap has elapsed since the previous call was released.
    #[instrument(level = "trace", skip_all)]
    pub async fn await_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.next_gap();
            if ready_at > Instant::now() {
                debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Pacing outbound request"
                );
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
