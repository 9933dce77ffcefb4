//! Bounded-wait health polling for postcondition checks.
//!
//! Imports only from `crate::domain`.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use crate::domain::HealthStatus;

/// Polling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Probe until healthy.
///
/// `Pending` keeps polling until `policy.timeout` has elapsed;
/// `Unhealthy` stops immediately. At least one probe always runs.
///
/// # Errors
///
/// Returns an error naming `what` on an unhealthy probe or when the deadline
/// passes, carrying the last observed status.
pub async fn poll_until_healthy<P, Fut>(what: &str, policy: PollPolicy, mut probe: P) -> Result<()>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = HealthStatus>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let status = probe().await;
        tracing::debug!(what, attempt, status = %status, "health probe");
        match status {
            HealthStatus::Healthy => return Ok(()),
            HealthStatus::Unhealthy(reason) => {
                anyhow::bail!("{what} is unhealthy: {reason}")
            }
            HealthStatus::Pending(reason) => {
                if Instant::now() + policy.interval > deadline {
                    anyhow::bail!(
                        "{what} not healthy after {}s ({attempt} attempts): {reason}",
                        policy.timeout.as_secs()
                    );
                }
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
