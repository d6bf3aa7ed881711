//! Health-check policy shared by the scanner and the stores.

use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::{HealthStatus, LinkHealth};

/// Stale targets fetched per scan.
pub const SCAN_BATCH_SIZE: usize = 50;
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(86_400);
/// Pause between two probes of one scan.
pub const PROBE_SPACING: Duration = Duration::from_secs(1);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_REDIRECTS: usize = 10;
pub const USER_AGENT: &str = "GoLinks-HealthChecker/1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Global or org link.
    Link,
    /// Personal link.
    Personal,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Link => "link",
            TargetKind::Personal => "personal",
        }
    }
}

/// A probe candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthTarget {
    pub kind: TargetKind,
    pub id: Uuid,
    pub keyword: String,
    pub url: String,
    pub health: LinkHealth,
}

/// Result of one probe attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Any HTTP response was received.
    Reachable { status: u16 },
    /// The SSRF guard refused the target; no request was made.
    Blocked(String),
    /// Connection, DNS or TLS failure.
    Failed(String),
    /// No answer within the timeout.
    TimedOut,
}

impl ProbeOutcome {
    /// Map to stored health. Timeouts go back to `unknown` with no
    /// `checked_at` so the target is picked up again next scan.
    pub fn into_health(self, now: SystemTime) -> LinkHealth {
        match self {
            ProbeOutcome::Reachable { .. } => LinkHealth {
                status: HealthStatus::Healthy,
                checked_at: Some(now),
                error: None,
            },
            ProbeOutcome::Blocked(msg) | ProbeOutcome::Failed(msg) => LinkHealth {
                status: HealthStatus::Unhealthy,
                checked_at: Some(now),
                error: Some(msg),
            },
            ProbeOutcome::TimedOut => LinkHealth {
                status: HealthStatus::Unknown,
                checked_at: None,
                error: Some("request timed out".into()),
            },
        }
    }
}

/// Targets checked before this instant are stale.
pub fn stale_cutoff(now: SystemTime, max_age: Duration) -> SystemTime {
    now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Staleness predicate used by the in-memory store.
pub fn is_stale(health: &LinkHealth, cutoff: SystemTime) -> bool {
    match health.checked_at {
        None => true,
        Some(at) => at < cutoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_response_is_healthy() {
        let now = SystemTime::now();
        for status in [200, 301, 404, 503] {
            let h = ProbeOutcome::Reachable { status }.into_health(now);
            assert_eq!(h.status, HealthStatus::Healthy);
            assert_eq!(h.checked_at, Some(now));
        }
    }

    #[test]
    fn blocked_and_failed_are_unhealthy_with_message() {
        let now = SystemTime::now();
        let h = ProbeOutcome::Blocked("private".into()).into_health(now);
        assert_eq!(h.status, HealthStatus::Unhealthy);
        assert_eq!(h.error.as_deref(), Some("private"));
        let h = ProbeOutcome::Failed("dns".into()).into_health(now);
        assert_eq!(h.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn timeout_keeps_checked_at_null_iff_unknown() {
        let h = ProbeOutcome::TimedOut.into_health(SystemTime::now());
        assert_eq!(h.status, HealthStatus::Unknown);
        assert!(h.checked_at.is_none());
    }

    #[test]
    fn staleness() {
        let now = SystemTime::now();
        let cutoff = stale_cutoff(now, DEFAULT_MAX_AGE);
        assert!(is_stale(&LinkHealth::unknown(), cutoff));
        let fresh = ProbeOutcome::Reachable { status: 200 }.into_health(now);
        assert!(!is_stale(&fresh, cutoff));
        let old = ProbeOutcome::Reachable { status: 200 }
            .into_health(now - Duration::from_secs(90_000));
        assert!(is_stale(&old, cutoff));
    }
}
