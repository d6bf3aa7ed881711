//! HTTP HEAD prober.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::health::{ProbeOutcome, MAX_REDIRECTS, PROBE_TIMEOUT, USER_AGENT};
use reqwest::redirect::Policy;
use tracing::debug;

use crate::ssrf::{
    check_literal, validate_for_health_check, BlockedAddress, ScreeningResolver, BLOCKED_MESSAGE,
};

/// Probes one target URL.
pub trait Prober: Send + Sync {
    fn probe(&self, url: &str) -> impl Future<Output = ProbeOutcome> + Send;
}

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        // literal hosts fail fast here; names are screened by the resolver
        let policy = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if check_literal(attempt.url()).is_err() {
                attempt.error(BLOCKED_MESSAGE)
            } else {
                attempt.follow()
            }
        });
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(policy)
            .dns_resolver(Arc::new(ScreeningResolver))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let target = match validate_for_health_check(url).await {
            Ok(u) => u,
            Err(msg) => return ProbeOutcome::Blocked(msg),
        };
        match self.client.head(target).send().await {
            Ok(resp) => ProbeOutcome::Reachable {
                status: resp.status().as_u16(),
            },
            Err(e) if e.is_timeout() => ProbeOutcome::TimedOut,
            Err(e) if is_blocked(&e) => ProbeOutcome::Blocked(BLOCKED_MESSAGE.into()),
            Err(e) => {
                debug!(%url, err = %e, "probe failed");
                ProbeOutcome::Failed(error_chain(&e))
            }
        }
    }
}

fn is_blocked(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        if inner.is::<BlockedAddress>() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// reqwest's top-level message is generic; include the root cause.
fn error_chain(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        msg = format!("{msg}: {inner}");
        source = inner.source();
    }
    msg
}
