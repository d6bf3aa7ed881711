//! Keyword resolution: personal, then org, then global.

use std::sync::Arc;

use crate::validate::normalize_keyword;
use crate::{
    Clock, CoreError, Keyword, LinkSource, LookupOutcome, Resolution, Store, User,
    SUGGESTION_LIMIT,
};

/// Which tiers are enabled for this deployment.
#[derive(Clone, Copy, Debug)]
pub struct ResolveOptions {
    pub personal_links: bool,
    pub org_links: bool,
}

impl ResolveOptions {
    /// Only global links, anonymous redirects.
    pub fn is_simple_mode(&self) -> bool {
        !self.personal_links && !self.org_links
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            personal_links: true,
            org_links: true,
        }
    }
}

pub struct Resolver<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
    options: ResolveOptions,
}

impl<S: Store + ?Sized, C: Clock> Resolver<S, C> {
    pub fn new(store: Arc<S>, clock: C, options: ResolveOptions) -> Self {
        Self {
            store,
            clock,
            options,
        }
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    fn tiers(&self, user: Option<&User>) -> (Option<uuid::Uuid>, Option<uuid::Uuid>) {
        let user_id = user
            .filter(|_| self.options.personal_links)
            .map(|u| u.id);
        let org_id = user
            .filter(|_| self.options.org_links)
            .and_then(|u| u.organization_id);
        (user_id, org_id)
    }

    /// Winning link for `keyword`, or `NotFound`. No side effects.
    pub fn resolve(&self, user: Option<&User>, keyword: &str) -> Result<Resolution, CoreError> {
        let keyword = Keyword::parse(keyword)?;
        let (user_id, org_id) = self.tiers(user);
        self.store
            .resolve_keyword(user_id, org_id, keyword.as_str())?
            .ok_or(CoreError::NotFound)
    }

    /// `fallback_url + keyword` when the user opted into a fallback redirect.
    /// The keyword is appended raw; the keyword charset needs no encoding.
    pub fn fallback_for(&self, user: &User, keyword: &str) -> Result<Option<String>, CoreError> {
        let Some(fallback_id) = user.fallback_redirect_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_fallback(fallback_id)?
            .map(|fb| format!("{}{}", fb.url, normalize_keyword(keyword))))
    }

    /// "Did you mean" candidates visible to the caller.
    pub fn suggest(&self, user: Option<&User>, keyword: &str) -> Result<Vec<String>, CoreError> {
        let (user_id, org_id) = self.tiers(user);
        self.store.similar_keywords(
            user_id,
            org_id,
            &normalize_keyword(keyword),
            SUGGESTION_LIMIT,
        )
    }

    /// Bump the click counter of the resolved row.
    pub fn record_click(&self, resolution: &Resolution) -> Result<(), CoreError> {
        match resolution.source {
            LinkSource::Personal => self.store.increment_user_link_clicks(resolution.link_id),
            LinkSource::Org | LinkSource::Global => {
                self.store.increment_link_clicks(resolution.link_id)
            }
        }
    }

    pub fn record_lookup(&self, keyword: &str, outcome: LookupOutcome) -> Result<(), CoreError> {
        self.store
            .record_lookup(&normalize_keyword(keyword), outcome, self.clock.now())
    }

    /// Uniformly random approved link among global and the caller's org links.
    pub fn random(&self, user: Option<&User>) -> Result<Resolution, CoreError> {
        let (_, org_id) = self.tiers(user);
        self.store.random_link(org_id)?.ok_or(CoreError::NotFound)
    }
}
