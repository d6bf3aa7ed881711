//! Background scan loop.

use std::sync::Arc;
use std::time::Duration;

use domain::health::{
    self, HealthTarget, DEFAULT_MAX_AGE, DEFAULT_SCAN_INTERVAL, PROBE_SPACING, SCAN_BATCH_SIZE,
};
use domain::notify::{Notification, Notifier, UnhealthyLink};
use domain::{Clock, CoreError, HealthStatus, LinkHealth, Store};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::probe::Prober;

#[derive(Debug, Clone)]
pub struct CheckerSettings {
    pub interval: Duration,
    pub max_age: Duration,
    /// Pause between two probes of one scan.
    pub spacing: Duration,
    pub batch_size: usize,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCAN_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
            spacing: PROBE_SPACING,
            batch_size: SCAN_BATCH_SIZE,
        }
    }
}

/// Counts for one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub cancelled: bool,
}

pub struct HealthChecker<S: ?Sized, P, C> {
    store: Arc<S>,
    prober: P,
    clock: C,
    notifier: Arc<dyn Notifier>,
    settings: CheckerSettings,
}

impl<S, P, C> HealthChecker<S, P, C>
where
    S: Store + ?Sized,
    P: Prober,
    C: Clock,
{
    pub fn new(
        store: Arc<S>,
        prober: P,
        clock: C,
        notifier: Arc<dyn Notifier>,
        settings: CheckerSettings,
    ) -> Self {
        Self {
            store,
            prober,
            clock,
            notifier,
            settings,
        }
    }

    /// Scan immediately, then every `interval`, until `shutdown` flips to true
    /// or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            max_age_secs = self.settings.max_age.as_secs(),
            "health checker started"
        );
        let mut interval = tokio::time::interval(self.settings.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }
            let report = self.scan_once(&shutdown).await;
            info!(
                checked = report.checked,
                healthy = report.healthy,
                unhealthy = report.unhealthy,
                unknown = report.unknown,
                "health scan finished"
            );
        }
        info!("health checker stopped");
    }

    /// One pass over the stale targets. Probe failures never fail the scan.
    pub async fn scan_once(&self, shutdown: &watch::Receiver<bool>) -> ScanReport {
        let mut report = ScanReport::default();
        let cutoff = health::stale_cutoff(self.clock.now(), self.settings.max_age);
        let targets = match self
            .store
            .list_stale_targets(cutoff, self.settings.batch_size)
        {
            Ok(t) => t,
            Err(e) => {
                warn!(err = %e, "listing stale targets failed");
                return report;
            }
        };
        debug!(count = targets.len(), "health scan starting");

        let mut stop = shutdown.clone();
        let mut went_unhealthy = Vec::new();
        for (i, target) in targets.iter().enumerate() {
            if *shutdown.borrow() {
                report.cancelled = true;
                break;
            }
            let step = async {
                if i > 0 && !self.settings.spacing.is_zero() {
                    tokio::time::sleep(self.settings.spacing).await;
                }
                self.check_target(target).await
            };
            // a pending request may run up to its timeout; shutdown must not wait for it
            let result = tokio::select! {
                r = step => r,
                _ = stop.changed() => {
                    report.cancelled = true;
                    break;
                }
            };
            let health = match result {
                Ok(h) => h,
                Err(e) => {
                    warn!(target_id = %target.id, err = %e, "recording health failed");
                    continue;
                }
            };
            report.checked += 1;
            match health.status {
                HealthStatus::Healthy => report.healthy += 1,
                HealthStatus::Unknown => report.unknown += 1,
                HealthStatus::Unhealthy => {
                    report.unhealthy += 1;
                    if target.health.status != HealthStatus::Unhealthy {
                        went_unhealthy.push(UnhealthyLink {
                            id: target.id,
                            keyword: target.keyword.clone(),
                            url: target.url.clone(),
                            error: health.error.clone(),
                        });
                    }
                }
            }
        }

        if !went_unhealthy.is_empty() {
            self.notifier.notify(Notification::LinksUnhealthy {
                links: went_unhealthy,
            });
        }
        report
    }

    /// Probe one target and persist the result.
    pub async fn check_target(&self, target: &HealthTarget) -> Result<LinkHealth, CoreError> {
        let outcome = self.prober.probe(&target.url).await;
        let now = self.clock.now();
        let health = outcome.into_health(now);
        self.store.record_health(target.kind, target.id, &health, now)?;
        debug!(
            target_id = %target.id,
            keyword = %target.keyword,
            status = health.status.as_str(),
            "probed"
        );
        Ok(health)
    }

    /// On-demand probe of a link or personal link by id.
    pub async fn check_by_id(&self, id: Uuid) -> Result<HealthTarget, CoreError> {
        let mut target = self
            .store
            .get_health_target(id)?
            .ok_or(CoreError::NotFound)?;
        target.health = self.check_target(&target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;
    use domain::health::{ProbeOutcome, TargetKind};
    use domain::{
        Keyword, Link, LinkRepository, LinkStatus, Scope, SystemClock, UpsertUser, UserLink,
        UserLinkRepository, UserRepository,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::SystemTime;

    struct FakeProber(HashMap<String, ProbeOutcome>);

    impl Prober for FakeProber {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            self.0
                .get(url)
                .cloned()
                .unwrap_or(ProbeOutcome::Reachable { status: 200 })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        fn notify(&self, event: Notification) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn approved(keyword: &str, url: &str) -> Link {
        let now = SystemTime::now();
        Link {
            id: Uuid::new_v4(),
            keyword: keyword.into(),
            url: url.into(),
            description: String::new(),
            scope: Scope::Global,
            organization_id: None,
            status: LinkStatus::Approved,
            created_by: None,
            submitted_by: None,
            reviewed_by: None,
            reviewed_at: None,
            deletion_requested_by: None,
            deletion_reason: None,
            click_count: 0,
            health: LinkHealth::unknown(),
            created_at: now,
            updated_at: now,
        }
    }

    fn settings() -> CheckerSettings {
        CheckerSettings {
            spacing: Duration::ZERO,
            ..Default::default()
        }
    }

    fn checker(
        repo: Arc<InMemoryRepo>,
        outcomes: &[(&str, ProbeOutcome)],
        notifier: Arc<Recorder>,
    ) -> HealthChecker<InMemoryRepo, FakeProber, SystemClock> {
        let map = outcomes
            .iter()
            .map(|(u, o)| (u.to_string(), o.clone()))
            .collect();
        HealthChecker::new(repo, FakeProber(map), SystemClock, notifier, settings())
    }

    #[tokio::test]
    async fn scan_updates_health_and_batches_notification() {
        let repo = Arc::new(InMemoryRepo::new());
        let ok = approved("ok", "https://ok.example");
        let bad = approved("bad", "https://bad.example");
        let slow = approved("slow", "https://slow.example");
        for l in [&ok, &bad, &slow] {
            repo.insert_link(l.clone()).unwrap();
        }
        let notifier = Arc::new(Recorder::default());
        let hc = checker(
            repo.clone(),
            &[
                ("https://bad.example", ProbeOutcome::Failed("connection refused".into())),
                ("https://slow.example", ProbeOutcome::TimedOut),
            ],
            notifier.clone(),
        );
        let (_tx, rx) = watch::channel(false);
        let report = hc.scan_once(&rx).await;
        assert_eq!(report.checked, 3);
        assert_eq!((report.healthy, report.unhealthy, report.unknown), (1, 1, 1));

        let bad_now = repo.get_link(bad.id).unwrap().unwrap();
        assert_eq!(bad_now.health.status, HealthStatus::Unhealthy);
        assert_eq!(bad_now.health.error.as_deref(), Some("connection refused"));
        let slow_now = repo.get_link(slow.id).unwrap().unwrap();
        assert!(slow_now.health.checked_at.is_none());

        let events = notifier.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Notification::LinksUnhealthy { links } => {
                assert_eq!(links.len(), 1);
                assert_eq!(links[0].keyword, "bad");
            }
            other => panic!("unexpected event {}", other.kind()),
        }
        drop(events);

        // fresh results are not rescanned; the timed-out one is
        let report = hc.scan_once(&rx).await;
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn cancelled_scan_stops_before_probing() {
        let repo = Arc::new(InMemoryRepo::new());
        repo.insert_link(approved("a", "https://a.example")).unwrap();
        let hc = checker(repo, &[], Arc::new(Recorder::default()));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let report = hc.scan_once(&rx).await;
        assert!(report.cancelled);
        assert_eq!(report.checked, 0);
    }

    struct HangingProber;

    impl Prober for HangingProber {
        async fn probe(&self, _url: &str) -> ProbeOutcome {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ProbeOutcome::TimedOut
        }
    }

    #[tokio::test]
    async fn shutdown_interrupts_in_flight_check() {
        let repo = Arc::new(InMemoryRepo::new());
        let link = approved("a", "https://a.example");
        repo.insert_link(link.clone()).unwrap();
        let hc = Arc::new(HealthChecker::new(
            repo.clone(),
            HangingProber,
            SystemClock,
            Arc::new(Recorder::default()) as Arc<dyn Notifier>,
            settings(),
        ));
        let (tx, rx) = watch::channel(false);
        let task = {
            let hc = hc.clone();
            tokio::spawn(async move { hc.scan_once(&rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("scan did not stop on shutdown")
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.checked, 0);
        let stored = repo.get_link(link.id).unwrap().unwrap();
        assert_eq!(stored.health.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn shutdown_interrupts_spacing_pause() {
        let repo = Arc::new(InMemoryRepo::new());
        for kw in ["a", "b"] {
            repo.insert_link(approved(kw, &format!("https://{kw}.example")))
                .unwrap();
        }
        let hc = Arc::new(HealthChecker::new(
            repo,
            FakeProber(HashMap::new()),
            SystemClock,
            Arc::new(Recorder::default()) as Arc<dyn Notifier>,
            CheckerSettings {
                spacing: Duration::from_secs(3600),
                ..Default::default()
            },
        ));
        let (tx, rx) = watch::channel(false);
        let task = {
            let hc = hc.clone();
            tokio::spawn(async move { hc.scan_once(&rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("scan did not stop on shutdown")
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn on_demand_probe_covers_personal_links() {
        let repo = Arc::new(InMemoryRepo::new());
        let owner = repo
            .upsert_user(
                UpsertUser {
                    sub: "alice".into(),
                    username: None,
                    email: "alice@example.com".into(),
                    name: "Alice".into(),
                    picture: String::new(),
                    organization_id: None,
                    oidc_mapped_role: None,
                    role: None,
                },
                SystemTime::now(),
            )
            .unwrap();
        let kw = Keyword::parse("mine").unwrap();
        let link = UserLink::new(owner.id, &kw, "http://10.0.0.1/", "", SystemTime::now());
        repo.insert_user_link(link.clone()).unwrap();
        let hc = checker(
            repo.clone(),
            &[("http://10.0.0.1/", ProbeOutcome::Blocked(crate::ssrf::BLOCKED_MESSAGE.into()))],
            Arc::new(Recorder::default()),
        );
        let t = hc.check_by_id(link.id).await.unwrap();
        assert_eq!(t.kind, TargetKind::Personal);
        assert_eq!(t.health.status, HealthStatus::Unhealthy);
        assert_eq!(
            hc.check_by_id(Uuid::new_v4()).await.unwrap_err(),
            CoreError::NotFound
        );
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let repo = Arc::new(InMemoryRepo::new());
        let hc = Arc::new(checker(repo, &[], Arc::new(Recorder::default())));
        let (tx, rx) = watch::channel(false);
        let task = {
            let hc = hc.clone();
            tokio::spawn(async move { hc.run(rx).await })
        };
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
