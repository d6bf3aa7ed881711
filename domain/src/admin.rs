//! Administrative operations.

use std::sync::Arc;

use uuid::Uuid;

use crate::authz::is_admin;
use crate::{Clock, CoreError, Organization, Role, Store, User};

pub struct Admin<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
}

impl<S: Store + ?Sized, C: Clock> Admin<S, C> {
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    fn require_admin(actor: &User) -> Result<(), CoreError> {
        if is_admin(actor) {
            Ok(())
        } else {
            Err(CoreError::Forbidden)
        }
    }

    pub fn create_organization(
        &self,
        actor: &User,
        slug: &str,
        name: &str,
    ) -> Result<Organization, CoreError> {
        Self::require_admin(actor)?;
        let slug = slug.trim().to_lowercase();
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidInput(
                "slug may only contain letters, digits, hyphens and underscores".into(),
            ));
        }
        let name = if name.trim().is_empty() {
            slug.clone()
        } else {
            name.trim().to_string()
        };
        let org = Organization::new(slug, name, self.clock.now());
        self.store.create_organization(org.clone())?;
        Ok(org)
    }

    pub fn list_organizations(&self, actor: &User) -> Result<Vec<Organization>, CoreError> {
        Self::require_admin(actor)?;
        self.store.list_organizations()
    }

    pub fn set_role(&self, actor: &User, user_id: Uuid, role: Role) -> Result<User, CoreError> {
        Self::require_admin(actor)?;
        if role == Role::OrgMod {
            let target = self.store.get_user(user_id)?.ok_or(CoreError::NotFound)?;
            if target.organization_id.is_none() {
                return Err(CoreError::InvalidInput(
                    "org_mod requires the user to belong to an organization".into(),
                ));
            }
        }
        self.store.set_user_role(user_id, role, self.clock.now())?;
        self.store.get_user(user_id)?.ok_or(CoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use crate::authz::tests::user;
    use crate::{UpsertUser, UserRepository};
    use std::time::SystemTime;

    struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    #[test]
    fn only_admins() {
        let admin = Admin::new(Arc::new(InMemoryRepo::new()), TestClock);
        let gm = user(Role::GlobalMod, None);
        assert_eq!(
            admin.create_organization(&gm, "acme", "Acme").unwrap_err(),
            CoreError::Forbidden
        );
    }

    #[test]
    fn create_org_normalizes_and_rejects_duplicates() {
        let admin = Admin::new(Arc::new(InMemoryRepo::new()), TestClock);
        let root = user(Role::Admin, None);
        let org = admin.create_organization(&root, " ACME ", "").unwrap();
        assert_eq!(org.slug, "acme");
        assert_eq!(org.name, "acme");
        assert_eq!(
            admin.create_organization(&root, "acme", "x").unwrap_err(),
            CoreError::AlreadyExists
        );
        assert!(admin.create_organization(&root, "a b", "x").is_err());
        assert_eq!(admin.list_organizations(&root).unwrap().len(), 1);
    }

    #[test]
    fn set_role_checks_org_membership() {
        let repo = Arc::new(InMemoryRepo::new());
        let admin = Admin::new(repo.clone(), TestClock);
        let root = user(Role::Admin, None);
        let target = repo
            .upsert_user(
                UpsertUser {
                    sub: "t".into(),
                    username: None,
                    email: "t@example.com".into(),
                    name: "T".into(),
                    picture: String::new(),
                    organization_id: None,
                    oidc_mapped_role: None,
                    role: None,
                },
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();
        assert!(admin.set_role(&root, target.id, Role::OrgMod).is_err());
        let updated = admin.set_role(&root, target.id, Role::GlobalMod).unwrap();
        assert_eq!(updated.role, Role::GlobalMod);
        assert_eq!(
            admin
                .set_role(&root, Uuid::new_v4(), Role::User)
                .unwrap_err(),
            CoreError::NotFound
        );
    }
}
