//! Shared HTTP utilities for the go-links workspace.
//!
//! Framework-agnostic pieces of the HTTP surface: the JSON envelope, time
//! formatting and content negotiation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::SystemTime;

// ============================================================================
// JSON envelope: {"status": "ok"|"error", "data"?: ..., "error"?: "..."}
// ============================================================================

/// Success envelope carrying `data`.
pub fn json_ok<T: Serialize>(data: T) -> serde_json::Value {
    match serde_json::to_value(data) {
        Ok(data) => serde_json::json!({"status": "ok", "data": data}),
        Err(e) => json_error(&format!("serialization failed: {e}")),
    }
}

/// Success envelope without a body.
pub fn json_ok_empty() -> serde_json::Value {
    serde_json::json!({"status": "ok"})
}

/// Error envelope with a human-readable message.
pub fn json_error(message: &str) -> serde_json::Value {
    serde_json::json!({"status": "error", "error": message})
}

// ============================================================================
// Content negotiation
// ============================================================================

/// True when the `Accept` header asks for JSON rather than a redirect/HTML.
pub fn wants_json(accept: Option<&str>) -> bool {
    accept
        .map(|a| {
            a.split(',')
                .map(|part| part.split(';').next().unwrap_or("").trim())
                .any(|mime| mime.eq_ignore_ascii_case("application/json"))
        })
        .unwrap_or(false)
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 string to SystemTime.
pub fn parse_rfc3339(s: &str) -> Result<SystemTime, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(s)?;
    Ok(dt.with_timezone(&Utc).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn envelope_shapes() {
        assert_eq!(
            json_ok(serde_json::json!({"keyword": "go"})),
            serde_json::json!({"status": "ok", "data": {"keyword": "go"}})
        );
        assert_eq!(json_ok_empty(), serde_json::json!({"status": "ok"}));
        assert_eq!(
            json_error("keyword not found"),
            serde_json::json!({"status": "error", "error": "keyword not found"})
        );
    }

    #[test]
    fn accept_negotiation() {
        assert!(wants_json(Some("application/json")));
        assert!(wants_json(Some("text/html, application/json;q=0.9")));
        assert!(!wants_json(Some("text/html,application/xhtml+xml")));
        assert!(!wants_json(Some("*/*")));
        assert!(!wants_json(None));
    }

    #[test]
    fn rfc3339_round_trip() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let s = system_time_to_rfc3339(t);
        assert_eq!(s, "2023-11-14T22:13:20Z");
        assert_eq!(parse_rfc3339(&s).unwrap(), t);
        assert!(parse_rfc3339("yesterday").is_err());
    }
}
