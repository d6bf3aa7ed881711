//! Role predicates. All pure functions of `(user, link)`.

use uuid::Uuid;

use crate::{Link, Role, Scope, User};

pub fn is_admin(user: &User) -> bool {
    user.role == Role::Admin
}

/// `global_mod` or `admin`.
pub fn is_global_mod(user: &User) -> bool {
    user.role >= Role::GlobalMod
}

/// Any moderator role.
pub fn is_org_mod(user: &User) -> bool {
    user.role >= Role::OrgMod
}

pub fn can_moderate_org(user: &User, organization_id: Uuid) -> bool {
    is_global_mod(user)
        || (user.role == Role::OrgMod && user.organization_id == Some(organization_id))
}

/// Global links need a global moderator; org links also accept that org's moderators.
pub fn can_moderate(user: &User, link: &Link) -> bool {
    if is_global_mod(user) {
        return true;
    }
    match (link.scope, link.organization_id) {
        (Scope::Org, Some(org)) => can_moderate_org(user, org),
        _ => false,
    }
}

/// Moderators of the link's scope or the link's creator.
pub fn can_manage(user: &User, link: &Link) -> bool {
    can_moderate(user, link) || link.created_by == Some(user.id)
}
