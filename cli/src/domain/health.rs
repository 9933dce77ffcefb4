//! Health status reported by postcondition probes.

use std::fmt;

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// The deployed artifact is live and healthy.
    Healthy,
    /// Not ready yet; keep polling until the deadline.
    Pending(String),
    /// Definitively broken; stop polling.
    Unhealthy(String),
}

impl HealthStatus {
    /// Map an HTTP status code to a probe result.
    ///
    /// 2xx is healthy; 5xx while the service restarts is pending, as are
    /// connection-level failures handled by the caller; everything else is
    /// unhealthy.
    #[must_use]
    pub fn from_http_status(code: u16) -> Self {
        match code {
            200..=299 => HealthStatus::Healthy,
            500..=599 => HealthStatus::Pending(format!("HTTP {code}")),
            _ => HealthStatus::Unhealthy(format!("HTTP {code}")),
        }
    }

    /// Map a failed registry lookup to a probe result.
    ///
    /// Authentication and authorization failures do not heal by waiting and
    /// are unhealthy; anything else is pending.
    #[must_use]
    pub fn from_registry_error(message: &str) -> Self {
        const PERMANENT: [&str; 5] = [
            "unauthorized",
            "denied",
            "forbidden",
            "authentication required",
            "no basic auth credentials",
        ];
        let lower = message.to_ascii_lowercase();
        if PERMANENT.iter().any(|needle| lower.contains(needle)) {
            HealthStatus::Unhealthy(message.to_string())
        } else {
            HealthStatus::Pending(message.to_string())
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Pending(why) => write!(f, "pending ({why})"),
            HealthStatus::Unhealthy(why) => write!(f, "unhealthy ({why})"),
        }
    }
}
