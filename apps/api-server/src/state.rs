//! Shared handler state: the store plus every service built on it.

use std::sync::Arc;

use axum::http::HeaderMap;
use domain::admin::Admin;
use domain::fallback::Fallbacks;
use domain::notify::Notifier;
use domain::personal::PersonalLinks;
use domain::resolver::{ResolveOptions, Resolver};
use domain::role_sync::{GroupRoleMapping, RoleSync};
use domain::service::LinkService;
use domain::sharing::Sharing;
use domain::{CoreError, LookupOutcome, Resolution, Store, SystemClock, User};
use health_checker::{CheckerSettings, HealthChecker, HttpProber};
use oidc_auth::{OidcConfig, OidcVerifier};
use tracing::warn;

use crate::auth::Authenticator;
use crate::config::{AuthProvider, Config};
use crate::error::ApiResult;

pub type Checker = HealthChecker<dyn Store, HttpProber, SystemClock>;

/// Startup failure while assembling the state.
#[derive(Debug)]
pub struct StartupError(pub String);

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StartupError {}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub resolver: Arc<Resolver<dyn Store, SystemClock>>,
    pub links: Arc<LinkService<dyn Store, SystemClock>>,
    pub personal: Arc<PersonalLinks<dyn Store, SystemClock>>,
    pub sharing: Arc<Sharing<dyn Store, SystemClock>>,
    pub fallbacks: Arc<Fallbacks<dyn Store, SystemClock>>,
    pub admin: Arc<Admin<dyn Store, SystemClock>>,
    pub role_sync: Arc<RoleSync<dyn Store, SystemClock>>,
    pub auth: Arc<Authenticator>,
    pub checker: Arc<Checker>,
    pub random_enabled: bool,
}

impl AppState {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StartupError> {
        let auth = match (&cfg.auth_provider, &cfg.oidc) {
            (AuthProvider::Oidc, Some(oidc)) => {
                let mut oc = OidcConfig::new(&oidc.issuer, &oidc.client_id);
                oc.org_claim = cfg.oidc_org_claim.clone();
                oc.groups_claim = cfg.oidc_groups_claim.clone();
                oc.insecure_skip_signature = cfg.insecure_skip_signature;
                let verifier =
                    OidcVerifier::new(oc).map_err(|e| StartupError(format!("oidc: {e}")))?;
                Authenticator::Oidc(verifier)
            }
            _ => Authenticator::Debug,
        };

        let prober = HttpProber::new().map_err(|e| StartupError(format!("prober: {e}")))?;
        let settings = CheckerSettings {
            interval: cfg.health_check_interval,
            max_age: cfg.health_check_max_age,
            ..CheckerSettings::default()
        };
        let checker = HealthChecker::new(
            store.clone(),
            prober,
            SystemClock,
            notifier.clone(),
            settings,
        );

        let options = ResolveOptions {
            personal_links: cfg.enable_personal_links,
            org_links: cfg.enable_org_links,
        };
        let mapping = GroupRoleMapping::new(
            cfg.oidc_admin_groups.clone(),
            cfg.oidc_moderator_groups.clone(),
        );

        Ok(Self {
            resolver: Arc::new(Resolver::new(store.clone(), SystemClock, options)),
            links: Arc::new(
                LinkService::new(store.clone(), SystemClock, notifier.clone())
                    .with_org_links(cfg.enable_org_links),
            ),
            personal: Arc::new(PersonalLinks::new(
                store.clone(),
                SystemClock,
                cfg.enable_personal_links,
            )),
            sharing: Arc::new(Sharing::new(
                store.clone(),
                SystemClock,
                notifier,
                cfg.enable_personal_links,
            )),
            fallbacks: Arc::new(Fallbacks::new(store.clone(), SystemClock)),
            admin: Arc::new(Admin::new(store.clone(), SystemClock)),
            role_sync: Arc::new(RoleSync::new(store.clone(), SystemClock, mapping)),
            auth: Arc::new(auth),
            checker: Arc::new(checker),
            random_enabled: cfg.enable_random_keywords,
            store,
        })
    }

    /// The calling user, if the request carries credentials. Every
    /// authenticated request runs the login upsert and role sync.
    pub async fn optional_user(&self, headers: &HeaderMap) -> ApiResult<Option<User>> {
        match self.auth.identify(headers).await? {
            Some(identity) => Ok(Some(self.role_sync.sync_login(identity)?)),
            None => Ok(None),
        }
    }

    pub async fn current_user(&self, headers: &HeaderMap) -> ApiResult<User> {
        self.optional_user(headers)
            .await?
            .ok_or_else(|| CoreError::Unauthorized.into())
    }

    /// Redirect endpoints are anonymous in simple mode.
    pub async fn redirect_user(&self, headers: &HeaderMap) -> ApiResult<Option<User>> {
        if self.resolver.options().is_simple_mode() {
            self.optional_user(headers).await
        } else {
            self.current_user(headers).await.map(Some)
        }
    }

    /// Bump the click counter off the request path.
    pub fn spawn_click(&self, resolution: Resolution) {
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            if let Err(e) = resolver.record_click(&resolution) {
                warn!(link_id = %resolution.link_id, err = %e, "click increment failed");
            }
        });
    }

    /// Count the lookup off the request path.
    pub fn spawn_lookup(&self, keyword: String, outcome: LookupOutcome) {
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            if let Err(e) = resolver.record_lookup(&keyword, outcome) {
                warn!(%keyword, outcome = outcome.as_str(), err = %e, "lookup counter failed");
            }
        });
    }
}
