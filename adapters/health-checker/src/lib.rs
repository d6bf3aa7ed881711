//! health-checker — background liveness probing of link targets.
//!
//! - `ssrf`: refuses targets that resolve to loopback, private, link-local or
//!   cloud-metadata addresses, both before the request and at every
//!   connection through the probe client's resolver.
//! - `probe`: the `Prober` seam and its `reqwest` HEAD implementation.
//! - `scheduler`: `HealthChecker`, which scans stale links on an interval,
//!   records the results and emits one batched notification per scan.

pub mod probe;
pub mod scheduler;
pub mod ssrf;

pub use probe::{HttpProber, Prober};
pub use scheduler::{CheckerSettings, HealthChecker, ScanReport};
pub use ssrf::validate_for_health_check;
