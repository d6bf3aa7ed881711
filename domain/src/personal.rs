//! Personal link management. Only the owner sees or touches a personal link.

use std::sync::Arc;

use uuid::Uuid;

use crate::validate::validate_url;
use crate::{Clock, CoreError, Keyword, Store, User, UserLink};

pub struct PersonalLinks<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
    enabled: bool,
}

impl<S: Store + ?Sized, C: Clock> PersonalLinks<S, C> {
    pub fn new(store: Arc<S>, clock: C, enabled: bool) -> Self {
        Self {
            store,
            clock,
            enabled,
        }
    }

    fn ensure_enabled(&self) -> Result<(), CoreError> {
        if self.enabled {
            Ok(())
        } else {
            Err(CoreError::FeatureDisabled("personal links"))
        }
    }

    /// Another user's link reads as absent.
    fn owned(&self, actor: &User, id: Uuid) -> Result<UserLink, CoreError> {
        match self.store.get_user_link(id)? {
            Some(link) if link.user_id == actor.id => Ok(link),
            _ => Err(CoreError::NotFound),
        }
    }

    pub fn create(
        &self,
        actor: &User,
        keyword: &str,
        url: &str,
        description: &str,
    ) -> Result<UserLink, CoreError> {
        self.ensure_enabled()?;
        let keyword = Keyword::parse(keyword)?;
        validate_url(url)?;
        let link = UserLink::new(actor.id, &keyword, url.trim(), description, self.clock.now());
        self.store.insert_user_link(link.clone())?;
        Ok(link)
    }

    pub fn get(&self, actor: &User, id: Uuid) -> Result<UserLink, CoreError> {
        self.ensure_enabled()?;
        self.owned(actor, id)
    }

    pub fn list(&self, actor: &User) -> Result<Vec<UserLink>, CoreError> {
        self.ensure_enabled()?;
        self.store.list_user_links(actor.id)
    }

    /// A changed URL resets the health fields.
    pub fn update(
        &self,
        actor: &User,
        id: Uuid,
        url: &str,
        description: &str,
    ) -> Result<UserLink, CoreError> {
        self.ensure_enabled()?;
        let current = self.owned(actor, id)?;
        validate_url(url)?;
        let url = url.trim();
        self.store
            .update_user_link(id, url, description, current.url != url, self.clock.now())
    }

    pub fn delete(&self, actor: &User, id: Uuid) -> Result<(), CoreError> {
        self.ensure_enabled()?;
        self.owned(actor, id)?;
        self.store.delete_user_link(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use crate::authz::tests::user;
    use crate::health::TargetKind;
    use crate::{HealthRepository, HealthStatus, LinkHealth, Role};
    use std::time::SystemTime;

    struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    fn svc() -> (Arc<InMemoryRepo>, PersonalLinks<InMemoryRepo, TestClock>) {
        let repo = Arc::new(InMemoryRepo::new());
        (repo.clone(), PersonalLinks::new(repo, TestClock, true))
    }

    #[test]
    fn create_list_delete() {
        let (_, svc) = svc();
        let me = user(Role::User, None);
        let link = svc.create(&me, "Mail", "https://mail.example", "inbox").unwrap();
        assert_eq!(link.keyword, "mail");
        assert_eq!(svc.list(&me).unwrap().len(), 1);
        assert_eq!(
            svc.create(&me, "mail", "https://other", "").unwrap_err(),
            CoreError::DuplicateKeyword
        );
        svc.delete(&me, link.id).unwrap();
        assert!(svc.list(&me).unwrap().is_empty());
    }

    #[test]
    fn keywords_are_per_user() {
        let (_, svc) = svc();
        let a = user(Role::User, None);
        let b = user(Role::User, None);
        svc.create(&a, "mail", "https://a", "").unwrap();
        assert!(svc.create(&b, "mail", "https://b", "").is_ok());
    }

    #[test]
    fn strangers_cannot_touch() {
        let (_, svc) = svc();
        let owner = user(Role::User, None);
        let admin = user(Role::Admin, None);
        let link = svc.create(&owner, "mail", "https://a", "").unwrap();
        assert_eq!(svc.get(&admin, link.id).unwrap_err(), CoreError::NotFound);
        assert_eq!(svc.delete(&admin, link.id).unwrap_err(), CoreError::NotFound);
    }

    #[test]
    fn url_change_resets_health() {
        let (repo, svc) = svc();
        let me = user(Role::User, None);
        let link = svc.create(&me, "mail", "https://a", "").unwrap();
        repo.record_health(
            TargetKind::Personal,
            link.id,
            &LinkHealth {
                status: HealthStatus::Unhealthy,
                checked_at: Some(SystemTime::UNIX_EPOCH),
                error: Some("dns".into()),
            },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap();
        let updated = svc.update(&me, link.id, "https://b", "").unwrap();
        assert_eq!(updated.health, LinkHealth::unknown());
    }

    #[test]
    fn disabled_feature() {
        let repo = Arc::new(InMemoryRepo::new());
        let svc = PersonalLinks::new(repo, TestClock, false);
        let me = user(Role::User, None);
        assert!(matches!(
            svc.list(&me),
            Err(CoreError::FeatureDisabled(_))
        ));
    }
}
