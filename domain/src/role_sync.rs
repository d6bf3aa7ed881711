//! Login-time user provisioning and OIDC group to role mapping.

use std::sync::Arc;

use uuid::Uuid;

use crate::{Clock, CoreError, MappedRole, Organization, Role, Store, UpsertUser, User};

/// Group names that grant elevated roles.
#[derive(Clone, Debug, Default)]
pub struct GroupRoleMapping {
    pub admin_groups: Vec<String>,
    pub moderator_groups: Vec<String>,
}

impl GroupRoleMapping {
    pub fn new(admin_groups: Vec<String>, moderator_groups: Vec<String>) -> Self {
        Self {
            admin_groups,
            moderator_groups,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.admin_groups.is_empty() || !self.moderator_groups.is_empty()
    }

    /// Highest role granted by `groups`, or `None` when no mapping is configured.
    pub fn mapped_role(&self, groups: &[String]) -> Option<MappedRole> {
        if !self.is_active() {
            return None;
        }
        let member_of = |configured: &[String]| groups.iter().any(|g| configured.contains(g));
        if member_of(&self.admin_groups) {
            Some(MappedRole::Admin)
        } else if member_of(&self.moderator_groups) {
            Some(MappedRole::Moderator)
        } else {
            Some(MappedRole::User)
        }
    }
}

/// Moderators become org moderators inside an organization and global
/// moderators outside one.
pub fn final_role(mapped: MappedRole, organization_id: Option<Uuid>) -> Role {
    match mapped {
        MappedRole::Admin => Role::Admin,
        MappedRole::Moderator if organization_id.is_some() => Role::OrgMod,
        MappedRole::Moderator => Role::GlobalMod,
        MappedRole::User => Role::User,
    }
}

/// Identity extracted from verified claims.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OidcIdentity {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub username: Option<String>,
    /// Organization slug from the configured org claim.
    pub org_slug: Option<String>,
    pub groups: Vec<String>,
}

pub struct RoleSync<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
    mapping: GroupRoleMapping,
}

impl<S: Store + ?Sized, C: Clock> RoleSync<S, C> {
    pub fn new(store: Arc<S>, clock: C, mapping: GroupRoleMapping) -> Self {
        Self {
            store,
            clock,
            mapping,
        }
    }

    /// Returns the organization and whether this call created it.
    fn ensure_organization(&self, slug: &str) -> Result<(Organization, bool), CoreError> {
        if let Some(org) = self.store.get_organization_by_slug(slug)? {
            return Ok((org, false));
        }
        let org = Organization::new(slug, slug, self.clock.now());
        match self.store.create_organization(org.clone()) {
            Ok(()) => Ok((org, true)),
            // lost a race with a concurrent login
            Err(CoreError::AlreadyExists) => self
                .store
                .get_organization_by_slug(slug)?
                .map(|o| (o, false))
                .ok_or(CoreError::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Upsert the user from their identity, provisioning the organization
    /// and applying the group mapping.
    pub fn sync_login(&self, identity: OidcIdentity) -> Result<User, CoreError> {
        if identity.sub.trim().is_empty() {
            return Err(CoreError::Unauthorized);
        }
        let org = match identity.org_slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => Some(self.ensure_organization(&slug.to_lowercase())?),
            _ => None,
        };
        let organization_id = org.as_ref().map(|(o, _)| o.id);
        let mapped = self.mapping.mapped_role(&identity.groups);
        let now = self.clock.now();

        let user = self.store.upsert_user(
            UpsertUser {
                sub: identity.sub,
                username: identity.username,
                email: identity.email,
                name: identity.name,
                picture: identity.picture,
                organization_id,
                oidc_mapped_role: mapped,
                role: mapped.map(|m| final_role(m, organization_id)),
            },
            now,
        )?;

        if let Some((org, true)) = org {
            if self.mapping.is_active() {
                self.store.promote_org_moderators(org.id, now)?;
                // the promotion may have covered the caller
                return self.store.get_user(user.id)?.ok_or(CoreError::NotFound);
            }
        }
        Ok(user)
    }
}
