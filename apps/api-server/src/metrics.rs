//! Prometheus exposition of the keyword lookup counters.
//!
//! The counters live in the store (pre-aggregated per keyword and outcome),
//! so every scrape builds a fresh registry from the table.

use domain::{CoreError, LookupRepository, Store};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const LOOKUPS_METRIC: &str = "golinks_keyword_lookups_total";

fn prom_err(e: prometheus::Error) -> CoreError {
    CoreError::Repository(format!("metrics: {e}"))
}

/// Render every lookup row in the text exposition format.
pub fn render(store: &dyn Store) -> Result<String, CoreError> {
    let registry = Registry::new();
    let lookups = IntCounterVec::new(
        Opts::new(LOOKUPS_METRIC, "Keyword lookups by outcome"),
        &["keyword", "outcome"],
    )
    .map_err(prom_err)?;
    registry
        .register(Box::new(lookups.clone()))
        .map_err(prom_err)?;

    for row in store.list_lookups()? {
        lookups
            .with_label_values(&[row.keyword.as_str(), row.outcome.as_str()])
            .inc_by(row.count);
    }

    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buf)
        .map_err(prom_err)?;
    String::from_utf8(buf).map_err(|e| CoreError::Repository(format!("metrics: {e}")))
}

/// Content type of [`render`]'s output.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;
    use domain::LookupOutcome;
    use std::time::SystemTime;

    #[test]
    fn one_sample_per_row() {
        let repo = InMemoryRepo::new();
        let now = SystemTime::now();
        for _ in 0..3 {
            repo.record_lookup("wiki", LookupOutcome::Resolved, now).unwrap();
        }
        repo.record_lookup("nope", LookupOutcome::NotFound, now).unwrap();

        let text = render(&repo).unwrap();
        assert!(text.contains("# TYPE golinks_keyword_lookups_total counter"));
        assert!(text.contains(r#"golinks_keyword_lookups_total{keyword="wiki",outcome="resolved"} 3"#));
        assert!(text.contains(r#"golinks_keyword_lookups_total{keyword="nope",outcome="not_found"} 1"#));
    }

    #[test]
    fn empty_table_renders_nothing() {
        let text = render(&InMemoryRepo::new()).unwrap();
        assert!(!text.contains("golinks_keyword_lookups_total{"));
    }
}
