//! Fallback redirect options and user opt-in.

use std::sync::Arc;

use uuid::Uuid;

use crate::authz::can_moderate_org;
use crate::validate::validate_url;
use crate::{Clock, CoreError, FallbackRedirect, Organization, Store, User};

pub struct Fallbacks<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
}

impl<S: Store + ?Sized, C: Clock> Fallbacks<S, C> {
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Admins and moderators of the organization.
    pub fn create(
        &self,
        actor: &User,
        organization_id: Uuid,
        name: &str,
        url: &str,
    ) -> Result<FallbackRedirect, CoreError> {
        if !can_moderate_org(actor, organization_id) {
            return Err(CoreError::Forbidden);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput("name is required".into()));
        }
        validate_url(url)?;
        let fallback = FallbackRedirect {
            id: Uuid::new_v4(),
            organization_id,
            name: name.to_string(),
            url: url.trim().to_string(),
            created_at: self.clock.now(),
        };
        self.store.insert_fallback(fallback.clone())?;
        Ok(fallback)
    }

    /// Options of the actor's organization (moderators may name another org).
    pub fn list(
        &self,
        actor: &User,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<FallbackRedirect>, CoreError> {
        let org = match organization_id.or(actor.organization_id) {
            Some(org) => org,
            None => return Ok(Vec::new()),
        };
        if actor.organization_id != Some(org) && !can_moderate_org(actor, org) {
            return Err(CoreError::Forbidden);
        }
        self.store.list_fallbacks(org)
    }

    pub fn delete(&self, actor: &User, id: Uuid) -> Result<(), CoreError> {
        let fallback = self.store.get_fallback(id)?.ok_or(CoreError::NotFound)?;
        if !can_moderate_org(actor, fallback.organization_id) {
            return Err(CoreError::Forbidden);
        }
        self.store.delete_fallback(id)
    }

    /// Opt into an option of the actor's own organization, or out with `None`.
    pub fn choose(&self, actor: &User, fallback_id: Option<Uuid>) -> Result<(), CoreError> {
        if let Some(id) = fallback_id {
            let fallback = self.store.get_fallback(id)?.ok_or(CoreError::NotFound)?;
            if actor.organization_id != Some(fallback.organization_id) {
                return Err(CoreError::Forbidden);
            }
        }
        self.store
            .set_user_fallback(actor.id, fallback_id, self.clock.now())
    }

    /// Apply `slug=url` pairs: set each organization's fallback URL and make
    /// sure a matching option exists for users to opt into. Unknown
    /// organizations are created.
    pub fn apply_org_fallbacks(&self, entries: &[(String, String)]) -> Result<usize, CoreError> {
        let mut applied = 0;
        for (slug, url) in entries {
            validate_url(url)?;
            let org = match self.store.get_organization_by_slug(slug)? {
                Some(org) => org,
                None => {
                    let org = Organization::new(slug.as_str(), slug.as_str(), self.clock.now());
                    self.store.create_organization(org.clone())?;
                    org
                }
            };
            self.store
                .set_organization_fallback_url(org.id, Some(url), self.clock.now())?;
            let existing = self.store.list_fallbacks(org.id)?;
            if !existing.iter().any(|f| &f.url == url) {
                self.store.insert_fallback(FallbackRedirect {
                    id: Uuid::new_v4(),
                    organization_id: org.id,
                    name: org.name.clone(),
                    url: url.clone(),
                    created_at: self.clock.now(),
                })?;
            }
            applied += 1;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use crate::authz::tests::user;
    use crate::{FallbackRepository, OrganizationRepository, Role, UpsertUser, UserRepository};
    use std::time::SystemTime;

    struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    fn setup() -> (Arc<InMemoryRepo>, Fallbacks<InMemoryRepo, TestClock>, Uuid) {
        let repo = Arc::new(InMemoryRepo::new());
        let org = Organization::new("acme", "Acme", SystemTime::UNIX_EPOCH);
        let org_id = org.id;
        repo.create_organization(org).unwrap();
        (repo.clone(), Fallbacks::new(repo, TestClock), org_id)
    }

    #[test]
    fn only_org_moderators_manage_options() {
        let (_, svc, org) = setup();
        let member = user(Role::User, Some(org));
        let om = user(Role::OrgMod, Some(org));
        assert_eq!(
            svc.create(&member, org, "wiki", "https://wiki/?q=").unwrap_err(),
            CoreError::Forbidden
        );
        let fb = svc.create(&om, org, "wiki", "https://wiki/?q=").unwrap();
        assert_eq!(svc.list(&member, None).unwrap(), vec![fb.clone()]);
        assert_eq!(svc.delete(&member, fb.id).unwrap_err(), CoreError::Forbidden);
        svc.delete(&om, fb.id).unwrap();
    }

    #[test]
    fn users_opt_in_within_their_org() {
        let (repo, svc, org) = setup();
        let om = user(Role::OrgMod, Some(org));
        let fb = svc.create(&om, org, "wiki", "https://wiki/?q=").unwrap();
        let member = repo
            .upsert_user(
                UpsertUser {
                    sub: "m".into(),
                    username: None,
                    email: "m@acme".into(),
                    name: "M".into(),
                    picture: String::new(),
                    organization_id: Some(org),
                    oidc_mapped_role: None,
                    role: None,
                },
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();
        svc.choose(&member, Some(fb.id)).unwrap();
        assert_eq!(
            repo.get_user(member.id).unwrap().unwrap().fallback_redirect_id,
            Some(fb.id)
        );
        let outsider = user(Role::User, None);
        assert_eq!(
            svc.choose(&outsider, Some(fb.id)).unwrap_err(),
            CoreError::Forbidden
        );
        svc.choose(&member, None).unwrap();
        assert_eq!(
            repo.get_user(member.id).unwrap().unwrap().fallback_redirect_id,
            None
        );
    }

    #[test]
    fn org_fallbacks_are_idempotent() {
        let (repo, svc, org) = setup();
        let entries = vec![
            ("acme".to_string(), "https://search.acme/?q=".to_string()),
            ("globex".to_string(), "https://globex/?q=".to_string()),
        ];
        assert_eq!(svc.apply_org_fallbacks(&entries).unwrap(), 2);
        assert_eq!(svc.apply_org_fallbacks(&entries).unwrap(), 2);
        let acme = repo.get_organization(org).unwrap().unwrap();
        assert_eq!(
            acme.fallback_redirect_url.as_deref(),
            Some("https://search.acme/?q=")
        );
        assert_eq!(repo.list_fallbacks(org).unwrap().len(), 1);
        assert!(repo.get_organization_by_slug("globex").unwrap().is_some());
    }
}
