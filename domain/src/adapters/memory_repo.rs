use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use uuid::Uuid;

use crate::health::{self, HealthTarget, TargetKind};
use crate::similarity::rank_similar;
use crate::{
    CoreError, EditRequestRepository, FallbackRedirect, FallbackRepository, HealthRepository,
    KeywordLookup, Link, LinkEditRequest, LinkFilter, LinkHealth, LinkRepository, LinkSource,
    LinkStatus, LookupOutcome, LookupRepository, ModerationScope, Organization,
    OrganizationRepository, RequestStatus, Resolution, ResolveRepository, Role, Scope,
    ShareRepository, SharedLink, Store, UpsertUser, User, UserLink, UserLinkRepository,
    UserRepository, MAX_INCOMING_SHARES, MAX_OUTGOING_SHARES, MAX_PENDING_REQUESTS,
};

#[derive(Default)]
struct State {
    organizations: BTreeMap<Uuid, Organization>,
    users: BTreeMap<Uuid, User>,
    links: BTreeMap<Uuid, Link>,
    user_links: BTreeMap<Uuid, UserLink>,
    edit_requests: BTreeMap<Uuid, LinkEditRequest>,
    shares: BTreeMap<Uuid, SharedLink>,
    fallbacks: BTreeMap<Uuid, FallbackRedirect>,
    lookups: BTreeMap<(String, &'static str), KeywordLookup>,
    /// Last probe attempt per target, timeouts included.
    health_attempts: BTreeMap<Uuid, SystemTime>,
}

impl State {
    fn keyword_taken(&self, link: &Link) -> bool {
        self.links.values().any(|l| {
            l.id != link.id
                && l.scope == link.scope
                && l.organization_id == link.organization_id
                && l.keyword == link.keyword
                && l.status.holds_keyword()
        })
    }

    fn pending_requests_of(&self, user_id: Uuid) -> usize {
        let edits = self
            .edit_requests
            .values()
            .filter(|r| r.user_id == user_id && r.status == RequestStatus::Pending)
            .count();
        let deletions = self
            .links
            .values()
            .filter(|l| {
                l.status == LinkStatus::DeletionPending && l.deletion_requested_by == Some(user_id)
            })
            .count();
        edits + deletions
    }

    fn guarded_link(&mut self, id: Uuid, expected: LinkStatus) -> Result<&mut Link, CoreError> {
        match self.links.get_mut(&id) {
            Some(link) if link.status == expected => Ok(link),
            _ => Err(CoreError::NotFound),
        }
    }

    fn visible_link<'a>(
        &'a self,
        organization_id: Option<Uuid>,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.values().filter(move |l| {
            l.status == LinkStatus::Approved
                && match l.scope {
                    Scope::Global => true,
                    Scope::Org => organization_id.is_some() && l.organization_id == organization_id,
                }
        })
    }
}

/// In-memory store used by tests and by the `memory` storage mode.
///
/// One mutex guards every table so multi-row operations are atomic, which is
/// how the DB-level constraints and transactions of the SQLite store are
/// emulated here.
pub struct InMemoryRepo {
    state: Mutex<State>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, CoreError> {
        self.state
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl OrganizationRepository for InMemoryRepo {
    fn get_organization(&self, id: Uuid) -> Result<Option<Organization>, CoreError> {
        Ok(self.lock()?.organizations.get(&id).cloned())
    }

    fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, CoreError> {
        Ok(self
            .lock()?
            .organizations
            .values()
            .find(|o| o.slug == slug)
            .cloned())
    }

    fn create_organization(&self, org: Organization) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if st.organizations.values().any(|o| o.slug == org.slug) {
            return Err(CoreError::AlreadyExists);
        }
        st.organizations.insert(org.id, org);
        Ok(())
    }

    fn list_organizations(&self) -> Result<Vec<Organization>, CoreError> {
        let mut orgs: Vec<_> = self.lock()?.organizations.values().cloned().collect();
        orgs.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(orgs)
    }

    fn set_organization_fallback_url(
        &self,
        id: Uuid,
        url: Option<&str>,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        let org = st.organizations.get_mut(&id).ok_or(CoreError::NotFound)?;
        org.fallback_redirect_url = url.map(str::to_string);
        org.updated_at = now;
        Ok(())
    }
}

impl UserRepository for InMemoryRepo {
    fn get_user(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn get_user_by_sub(&self, sub: &str) -> Result<Option<User>, CoreError> {
        Ok(self.lock()?.users.values().find(|u| u.sub == sub).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn upsert_user(&self, input: UpsertUser, now: SystemTime) -> Result<User, CoreError> {
        let mut st = self.lock()?;
        if let Some(existing) = st.users.values_mut().find(|u| u.sub == input.sub) {
            existing.username = input.username;
            existing.email = input.email;
            existing.name = input.name;
            existing.picture = input.picture;
            existing.organization_id = input.organization_id;
            existing.oidc_mapped_role = input.oidc_mapped_role;
            if let Some(role) = input.role {
                existing.role = role;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            sub: input.sub,
            username: input.username,
            email: input.email,
            name: input.name,
            picture: input.picture,
            role: input.role.unwrap_or(Role::User),
            organization_id: input.organization_id,
            oidc_mapped_role: input.oidc_mapped_role,
            fallback_redirect_id: None,
            created_at: now,
            updated_at: now,
        };
        st.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn set_user_role(&self, id: Uuid, role: Role, now: SystemTime) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        let user = st.users.get_mut(&id).ok_or(CoreError::NotFound)?;
        user.role = role;
        user.updated_at = now;
        Ok(())
    }

    fn set_user_fallback(
        &self,
        id: Uuid,
        fallback_id: Option<Uuid>,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if let Some(fid) = fallback_id {
            if !st.fallbacks.contains_key(&fid) {
                return Err(CoreError::NotFound);
            }
        }
        let user = st.users.get_mut(&id).ok_or(CoreError::NotFound)?;
        user.fallback_redirect_id = fallback_id;
        user.updated_at = now;
        Ok(())
    }

    fn list_moderators(&self, organization_id: Option<Uuid>) -> Result<Vec<User>, CoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .filter(|u| {
                u.role >= Role::GlobalMod
                    || (u.role == Role::OrgMod
                        && organization_id.is_some()
                        && u.organization_id == organization_id)
            })
            .cloned()
            .collect())
    }

    fn promote_org_moderators(
        &self,
        organization_id: Uuid,
        now: SystemTime,
    ) -> Result<usize, CoreError> {
        let mut st = self.lock()?;
        let mut promoted = 0;
        for u in st.users.values_mut() {
            if u.organization_id == Some(organization_id)
                && u.oidc_mapped_role == Some(crate::MappedRole::Moderator)
                && u.role == Role::User
            {
                u.role = Role::OrgMod;
                u.updated_at = now;
                promoted += 1;
            }
        }
        Ok(promoted)
    }
}

impl LinkRepository for InMemoryRepo {
    fn get_link(&self, id: Uuid) -> Result<Option<Link>, CoreError> {
        Ok(self.lock()?.links.get(&id).cloned())
    }

    fn insert_link(&self, link: Link) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if (link.scope == Scope::Org) != link.organization_id.is_some() {
            return Err(CoreError::InvalidInput(
                "organization is required for org links only".into(),
            ));
        }
        if link.status.holds_keyword() && st.keyword_taken(&link) {
            return Err(CoreError::DuplicateKeyword);
        }
        st.links.insert(link.id, link);
        Ok(())
    }

    fn update_link_target(
        &self,
        id: Uuid,
        url: &str,
        description: &str,
        reset_health: bool,
        now: SystemTime,
    ) -> Result<Link, CoreError> {
        let mut st = self.lock()?;
        let link = st.links.get_mut(&id).ok_or(CoreError::NotFound)?;
        link.url = url.to_string();
        link.description = description.to_string();
        if reset_health {
            link.health = LinkHealth::unknown();
        }
        link.updated_at = now;
        let link = link.clone();
        if reset_health {
            st.health_attempts.remove(&id);
        }
        Ok(link)
    }

    fn approve_link(&self, id: Uuid, reviewer: Uuid, now: SystemTime) -> Result<Link, CoreError> {
        let mut st = self.lock()?;
        let link = st.guarded_link(id, LinkStatus::Pending)?;
        link.status = LinkStatus::Approved;
        link.reviewed_by = Some(reviewer);
        link.reviewed_at = Some(now);
        link.updated_at = now;
        Ok(link.clone())
    }

    fn reject_link(&self, id: Uuid, reviewer: Uuid, now: SystemTime) -> Result<Link, CoreError> {
        let mut st = self.lock()?;
        let link = st.guarded_link(id, LinkStatus::Pending)?;
        link.status = LinkStatus::Rejected;
        link.reviewed_by = Some(reviewer);
        link.reviewed_at = Some(now);
        link.updated_at = now;
        Ok(link.clone())
    }

    fn mark_deletion_pending(
        &self,
        id: Uuid,
        requester: Uuid,
        reason: &str,
        now: SystemTime,
    ) -> Result<Link, CoreError> {
        let mut st = self.lock()?;
        st.guarded_link(id, LinkStatus::Approved)?;
        if st.pending_requests_of(requester) >= MAX_PENDING_REQUESTS {
            return Err(CoreError::PendingRequestLimit);
        }
        let link = st.guarded_link(id, LinkStatus::Approved)?;
        link.status = LinkStatus::DeletionPending;
        link.deletion_requested_by = Some(requester);
        link.deletion_reason = Some(reason.to_string());
        link.updated_at = now;
        Ok(link.clone())
    }

    fn restore_link(&self, id: Uuid, now: SystemTime) -> Result<Link, CoreError> {
        let mut st = self.lock()?;
        let link = st.guarded_link(id, LinkStatus::DeletionPending)?;
        link.status = LinkStatus::Approved;
        link.deletion_requested_by = None;
        link.deletion_reason = None;
        link.updated_at = now;
        Ok(link.clone())
    }

    fn delete_link(&self, id: Uuid, expected: Option<LinkStatus>) -> Result<Link, CoreError> {
        let mut st = self.lock()?;
        match (st.links.get(&id), expected) {
            (None, _) => return Err(CoreError::NotFound),
            (Some(l), Some(status)) if l.status != status => return Err(CoreError::NotFound),
            _ => {}
        }
        st.edit_requests.retain(|_, r| r.link_id != id);
        st.health_attempts.remove(&id);
        st.links.remove(&id).ok_or(CoreError::NotFound)
    }

    fn list_links(&self, filter: &LinkFilter) -> Result<Vec<Link>, CoreError> {
        let st = self.lock()?;
        let mut out: Vec<Link> = st
            .links
            .values()
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.scope.map_or(true, |s| l.scope == s))
            .filter(|l| {
                filter
                    .organization_id
                    .map_or(true, |o| l.organization_id == Some(o))
            })
            .filter(|l| filter.created_by.map_or(true, |c| l.created_by == Some(c)))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.keyword
                .cmp(&b.keyword)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        Ok(out)
    }

    fn increment_link_clicks(&self, id: Uuid) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        let link = st.links.get_mut(&id).ok_or(CoreError::NotFound)?;
        link.click_count += 1;
        Ok(())
    }
}

impl UserLinkRepository for InMemoryRepo {
    fn get_user_link(&self, id: Uuid) -> Result<Option<UserLink>, CoreError> {
        Ok(self.lock()?.user_links.get(&id).cloned())
    }

    fn find_user_link(&self, user_id: Uuid, keyword: &str) -> Result<Option<UserLink>, CoreError> {
        Ok(self
            .lock()?
            .user_links
            .values()
            .find(|l| l.user_id == user_id && l.keyword == keyword)
            .cloned())
    }

    fn insert_user_link(&self, link: UserLink) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if st
            .user_links
            .values()
            .any(|l| l.user_id == link.user_id && l.keyword == link.keyword)
        {
            return Err(CoreError::DuplicateKeyword);
        }
        st.user_links.insert(link.id, link);
        Ok(())
    }

    fn update_user_link(
        &self,
        id: Uuid,
        url: &str,
        description: &str,
        reset_health: bool,
        now: SystemTime,
    ) -> Result<UserLink, CoreError> {
        let mut st = self.lock()?;
        let link = st.user_links.get_mut(&id).ok_or(CoreError::NotFound)?;
        link.url = url.to_string();
        link.description = description.to_string();
        if reset_health {
            link.health = LinkHealth::unknown();
        }
        link.updated_at = now;
        let link = link.clone();
        if reset_health {
            st.health_attempts.remove(&id);
        }
        Ok(link)
    }

    fn delete_user_link(&self, id: Uuid) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        st.health_attempts.remove(&id);
        st.user_links
            .remove(&id)
            .map(|_| ())
            .ok_or(CoreError::NotFound)
    }

    fn list_user_links(&self, user_id: Uuid) -> Result<Vec<UserLink>, CoreError> {
        let mut out: Vec<_> = self
            .lock()?
            .user_links
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        Ok(out)
    }

    fn increment_user_link_clicks(&self, id: Uuid) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        let link = st.user_links.get_mut(&id).ok_or(CoreError::NotFound)?;
        link.click_count += 1;
        Ok(())
    }
}

impl EditRequestRepository for InMemoryRepo {
    fn insert_edit_request(&self, req: LinkEditRequest) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if !st.links.contains_key(&req.link_id) {
            return Err(CoreError::NotFound);
        }
        if st.pending_requests_of(req.user_id) >= MAX_PENDING_REQUESTS {
            return Err(CoreError::PendingRequestLimit);
        }
        if st.edit_requests.values().any(|r| {
            r.link_id == req.link_id && r.user_id == req.user_id && r.status == RequestStatus::Pending
        }) {
            return Err(CoreError::DuplicateEditRequest);
        }
        st.edit_requests.insert(req.id, req);
        Ok(())
    }

    fn get_edit_request(&self, id: Uuid) -> Result<Option<LinkEditRequest>, CoreError> {
        Ok(self.lock()?.edit_requests.get(&id).cloned())
    }

    fn list_pending_edit_requests(
        &self,
        scope: ModerationScope,
    ) -> Result<Vec<LinkEditRequest>, CoreError> {
        let st = self.lock()?;
        let mut out: Vec<_> = st
            .edit_requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .filter(|r| match scope {
                ModerationScope::All => true,
                ModerationScope::Organization(org) => st
                    .links
                    .get(&r.link_id)
                    .is_some_and(|l| l.scope == Scope::Org && l.organization_id == Some(org)),
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn approve_edit_request(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: SystemTime,
    ) -> Result<(LinkEditRequest, Link), CoreError> {
        let mut st = self.lock()?;
        let req = match st.edit_requests.get(&id) {
            Some(r) if r.status == RequestStatus::Pending => r.clone(),
            _ => return Err(CoreError::NotFound),
        };
        let link = st.links.get_mut(&req.link_id).ok_or(CoreError::NotFound)?;
        link.url = req.url.clone();
        link.description = req.description.clone();
        link.health = LinkHealth::unknown();
        link.updated_at = now;
        let link = link.clone();
        st.health_attempts.remove(&link.id);
        let stored = st.edit_requests.get_mut(&id).ok_or(CoreError::NotFound)?;
        stored.status = RequestStatus::Approved;
        stored.reviewed_by = Some(reviewer);
        stored.reviewed_at = Some(now);
        Ok((stored.clone(), link))
    }

    fn reject_edit_request(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: SystemTime,
    ) -> Result<LinkEditRequest, CoreError> {
        let mut st = self.lock()?;
        match st.edit_requests.get_mut(&id) {
            Some(r) if r.status == RequestStatus::Pending => {
                r.status = RequestStatus::Rejected;
                r.reviewed_by = Some(reviewer);
                r.reviewed_at = Some(now);
                Ok(r.clone())
            }
            _ => Err(CoreError::NotFound),
        }
    }

    fn count_pending_requests(&self, user_id: Uuid) -> Result<usize, CoreError> {
        Ok(self.lock()?.pending_requests_of(user_id))
    }
}

impl ShareRepository for InMemoryRepo {
    fn insert_share(&self, share: SharedLink) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if share.sender_id == share.recipient_id {
            return Err(CoreError::InvalidInput(
                "cannot share a link with yourself".into(),
            ));
        }
        let outgoing = st
            .shares
            .values()
            .filter(|s| s.sender_id == share.sender_id)
            .count();
        if outgoing >= MAX_OUTGOING_SHARES {
            return Err(CoreError::ShareLimitReached);
        }
        let incoming = st
            .shares
            .values()
            .filter(|s| s.recipient_id == share.recipient_id)
            .count();
        if incoming >= MAX_INCOMING_SHARES {
            return Err(CoreError::RecipientLimitReached);
        }
        if st.shares.values().any(|s| {
            s.sender_id == share.sender_id
                && s.recipient_id == share.recipient_id
                && s.keyword == share.keyword
        }) {
            return Err(CoreError::DuplicateShare);
        }
        st.shares.insert(share.id, share);
        Ok(())
    }

    fn get_share(&self, id: Uuid) -> Result<Option<SharedLink>, CoreError> {
        Ok(self.lock()?.shares.get(&id).cloned())
    }

    fn list_incoming_shares(&self, recipient_id: Uuid) -> Result<Vec<SharedLink>, CoreError> {
        let mut out: Vec<_> = self
            .lock()?
            .shares
            .values()
            .filter(|s| s.recipient_id == recipient_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn list_outgoing_shares(&self, sender_id: Uuid) -> Result<Vec<SharedLink>, CoreError> {
        let mut out: Vec<_> = self
            .lock()?
            .shares
            .values()
            .filter(|s| s.sender_id == sender_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn accept_share(&self, id: Uuid, link: UserLink) -> Result<UserLink, CoreError> {
        let mut st = self.lock()?;
        if !st.shares.contains_key(&id) {
            return Err(CoreError::NotFound);
        }
        if st
            .user_links
            .values()
            .any(|l| l.user_id == link.user_id && l.keyword == link.keyword)
        {
            return Err(CoreError::DuplicateKeyword);
        }
        st.shares.remove(&id);
        st.user_links.insert(link.id, link.clone());
        Ok(link)
    }

    fn delete_share(&self, id: Uuid) -> Result<(), CoreError> {
        self.lock()?
            .shares
            .remove(&id)
            .map(|_| ())
            .ok_or(CoreError::NotFound)
    }
}

impl FallbackRepository for InMemoryRepo {
    fn insert_fallback(&self, fallback: FallbackRedirect) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if !st.organizations.contains_key(&fallback.organization_id) {
            return Err(CoreError::NotFound);
        }
        st.fallbacks.insert(fallback.id, fallback);
        Ok(())
    }

    fn get_fallback(&self, id: Uuid) -> Result<Option<FallbackRedirect>, CoreError> {
        Ok(self.lock()?.fallbacks.get(&id).cloned())
    }

    fn list_fallbacks(&self, organization_id: Uuid) -> Result<Vec<FallbackRedirect>, CoreError> {
        let mut out: Vec<_> = self
            .lock()?
            .fallbacks
            .values()
            .filter(|f| f.organization_id == organization_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn delete_fallback(&self, id: Uuid) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        if st.fallbacks.remove(&id).is_none() {
            return Err(CoreError::NotFound);
        }
        for u in st.users.values_mut() {
            if u.fallback_redirect_id == Some(id) {
                u.fallback_redirect_id = None;
            }
        }
        Ok(())
    }
}

impl ResolveRepository for InMemoryRepo {
    fn resolve_keyword(
        &self,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        keyword: &str,
    ) -> Result<Option<Resolution>, CoreError> {
        let st = self.lock()?;
        if let Some(uid) = user_id {
            if let Some(l) = st
                .user_links
                .values()
                .find(|l| l.user_id == uid && l.keyword == keyword)
            {
                return Ok(Some(Resolution {
                    link_id: l.id,
                    keyword: l.keyword.clone(),
                    url: l.url.clone(),
                    source: LinkSource::Personal,
                }));
            }
        }
        let approved = |scope: Scope, org: Option<Uuid>| {
            st.links.values().find(move |l| {
                l.scope == scope
                    && l.organization_id == org
                    && l.keyword == keyword
                    && l.status == LinkStatus::Approved
            })
        };
        if let Some(org) = organization_id {
            if let Some(l) = approved(Scope::Org, Some(org)) {
                return Ok(Some(Resolution {
                    link_id: l.id,
                    keyword: l.keyword.clone(),
                    url: l.url.clone(),
                    source: LinkSource::Org,
                }));
            }
        }
        Ok(approved(Scope::Global, None).map(|l| Resolution {
            link_id: l.id,
            keyword: l.keyword.clone(),
            url: l.url.clone(),
            source: LinkSource::Global,
        }))
    }

    fn similar_keywords(
        &self,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        let st = self.lock()?;
        let mut candidates: Vec<String> = st
            .visible_link(organization_id)
            .map(|l| l.keyword.clone())
            .collect();
        if let Some(uid) = user_id {
            candidates.extend(
                st.user_links
                    .values()
                    .filter(|l| l.user_id == uid)
                    .map(|l| l.keyword.clone()),
            );
        }
        Ok(rank_similar(keyword, candidates, limit))
    }

    fn random_link(&self, organization_id: Option<Uuid>) -> Result<Option<Resolution>, CoreError> {
        let st = self.lock()?;
        let pool: Vec<&Link> = st.visible_link(organization_id).collect();
        if pool.is_empty() {
            return Ok(None);
        }
        let pick = (Uuid::new_v4().as_u128() % pool.len() as u128) as usize;
        let l = pool[pick];
        Ok(Some(Resolution {
            link_id: l.id,
            keyword: l.keyword.clone(),
            url: l.url.clone(),
            source: match l.scope {
                Scope::Global => LinkSource::Global,
                Scope::Org => LinkSource::Org,
            },
        }))
    }
}

impl HealthRepository for InMemoryRepo {
    fn list_stale_targets(
        &self,
        cutoff: SystemTime,
        limit: usize,
    ) -> Result<Vec<HealthTarget>, CoreError> {
        let st = self.lock()?;
        let links = st
            .links
            .values()
            .filter(|l| l.status == LinkStatus::Approved && health::is_stale(&l.health, cutoff))
            .map(|l| HealthTarget {
                kind: TargetKind::Link,
                id: l.id,
                keyword: l.keyword.clone(),
                url: l.url.clone(),
                health: l.health.clone(),
            });
        let personal = st
            .user_links
            .values()
            .filter(|l| health::is_stale(&l.health, cutoff))
            .map(|l| HealthTarget {
                kind: TargetKind::Personal,
                id: l.id,
                keyword: l.keyword.clone(),
                url: l.url.clone(),
                health: l.health.clone(),
            });
        let mut out: Vec<HealthTarget> = links.chain(personal).collect();
        // never attempted first, then least recently attempted
        out.sort_by_key(|t| st.health_attempts.get(&t.id).copied());
        out.truncate(limit);
        Ok(out)
    }

    fn get_health_target(&self, id: Uuid) -> Result<Option<HealthTarget>, CoreError> {
        let st = self.lock()?;
        if let Some(l) = st.links.get(&id) {
            return Ok(Some(HealthTarget {
                kind: TargetKind::Link,
                id: l.id,
                keyword: l.keyword.clone(),
                url: l.url.clone(),
                health: l.health.clone(),
            }));
        }
        Ok(st.user_links.get(&id).map(|l| HealthTarget {
            kind: TargetKind::Personal,
            id: l.id,
            keyword: l.keyword.clone(),
            url: l.url.clone(),
            health: l.health.clone(),
        }))
    }

    fn record_health(
        &self,
        kind: TargetKind,
        id: Uuid,
        health: &LinkHealth,
        attempted_at: SystemTime,
    ) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        let slot = match kind {
            TargetKind::Link => st.links.get_mut(&id).map(|l| &mut l.health),
            TargetKind::Personal => st.user_links.get_mut(&id).map(|l| &mut l.health),
        };
        match slot {
            Some(h) => {
                *h = health.clone();
                st.health_attempts.insert(id, attempted_at);
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }
}

impl LookupRepository for InMemoryRepo {
    fn record_lookup(
        &self,
        keyword: &str,
        outcome: LookupOutcome,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let mut st = self.lock()?;
        let entry = st
            .lookups
            .entry((keyword.to_string(), outcome.as_str()))
            .or_insert_with(|| KeywordLookup {
                keyword: keyword.to_string(),
                outcome,
                count: 0,
                last_seen_at: now,
            });
        entry.count += 1;
        entry.last_seen_at = now;
        Ok(())
    }

    fn list_lookups(&self) -> Result<Vec<KeywordLookup>, CoreError> {
        Ok(self.lock()?.lookups.values().cloned().collect())
    }
}

impl Store for InMemoryRepo {
    fn ping(&self) -> Result<(), CoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::tests::user;
    use crate::{HealthStatus, Keyword};
    use std::time::Duration;

    fn link(keyword: &str, scope: Scope, org: Option<Uuid>, status: LinkStatus) -> Link {
        let now = SystemTime::UNIX_EPOCH;
        Link {
            id: Uuid::new_v4(),
            keyword: keyword.into(),
            url: format!("https://{keyword}.example"),
            description: String::new(),
            scope,
            organization_id: org,
            status,
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

    fn add_user(repo: &InMemoryRepo, role: Role, org: Option<Uuid>) -> User {
        let u = user(role, org);
        repo.lock().unwrap().users.insert(u.id, u.clone());
        u
    }

    #[test]
    fn keyword_unique_per_scope_while_held() {
        let repo = InMemoryRepo::new();
        repo.insert_link(link("foo", Scope::Global, None, LinkStatus::Pending))
            .unwrap();
        let err = repo
            .insert_link(link("foo", Scope::Global, None, LinkStatus::Pending))
            .unwrap_err();
        assert_eq!(err, CoreError::DuplicateKeyword);

        // other scope is fine
        let org = Uuid::new_v4();
        repo.insert_link(link("foo", Scope::Org, Some(org), LinkStatus::Approved))
            .unwrap();
        // rejected rows never conflict
        repo.insert_link(link("foo", Scope::Global, None, LinkStatus::Rejected))
            .unwrap();
    }

    #[test]
    fn org_scope_requires_org() {
        let repo = InMemoryRepo::new();
        assert!(repo
            .insert_link(link("x", Scope::Org, None, LinkStatus::Pending))
            .is_err());
        assert!(repo
            .insert_link(link("x", Scope::Global, Some(Uuid::new_v4()), LinkStatus::Pending))
            .is_err());
    }

    #[test]
    fn approve_twice_returns_not_found() {
        let repo = InMemoryRepo::new();
        let l = link("foo", Scope::Global, None, LinkStatus::Pending);
        let id = l.id;
        repo.insert_link(l).unwrap();
        let reviewer = Uuid::new_v4();
        let approved = repo.approve_link(id, reviewer, SystemTime::now()).unwrap();
        assert_eq!(approved.status, LinkStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(reviewer));
        assert_eq!(
            repo.approve_link(id, reviewer, SystemTime::now()).unwrap_err(),
            CoreError::NotFound
        );
    }

    #[test]
    fn lookup_counter_counts() {
        let repo = InMemoryRepo::new();
        for _ in 0..7 {
            repo.record_lookup("go", LookupOutcome::Resolved, SystemTime::now())
                .unwrap();
        }
        repo.record_lookup("go", LookupOutcome::NotFound, SystemTime::now())
            .unwrap();
        let rows = repo.list_lookups().unwrap();
        let resolved = rows
            .iter()
            .find(|r| r.outcome == LookupOutcome::Resolved)
            .unwrap();
        assert_eq!(resolved.count, 7);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn deleting_fallback_clears_user_choice() {
        let repo = InMemoryRepo::new();
        let org = Organization::new("acme", "Acme", SystemTime::now());
        let org_id = org.id;
        repo.create_organization(org).unwrap();
        let fb = FallbackRedirect {
            id: Uuid::new_v4(),
            organization_id: org_id,
            name: "wiki".into(),
            url: "https://wiki.acme/search?q=".into(),
            created_at: SystemTime::now(),
        };
        let fb_id = fb.id;
        repo.insert_fallback(fb).unwrap();
        let u = add_user(&repo, Role::User, Some(org_id));
        repo.set_user_fallback(u.id, Some(fb_id), SystemTime::now())
            .unwrap();
        repo.delete_fallback(fb_id).unwrap();
        assert_eq!(repo.get_user(u.id).unwrap().unwrap().fallback_redirect_id, None);
    }

    #[test]
    fn stale_targets_skip_fresh_and_unapproved() {
        let repo = InMemoryRepo::new();
        let now = SystemTime::now();
        let stale = link("stale", Scope::Global, None, LinkStatus::Approved);
        let pending = link("pending", Scope::Global, None, LinkStatus::Pending);
        let mut fresh = link("fresh", Scope::Global, None, LinkStatus::Approved);
        fresh.health = LinkHealth {
            status: HealthStatus::Healthy,
            checked_at: Some(now),
            error: None,
        };
        let stale_id = stale.id;
        repo.insert_link(stale).unwrap();
        repo.insert_link(pending).unwrap();
        repo.insert_link(fresh).unwrap();
        let u = add_user(&repo, Role::User, None);
        let personal = UserLink::new(
            u.id,
            &Keyword::parse("mine").unwrap(),
            "https://mine.example",
            "",
            now,
        );
        repo.insert_user_link(personal).unwrap();

        let cutoff = health::stale_cutoff(now, Duration::from_secs(3600));
        let targets = repo.list_stale_targets(cutoff, 50).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().any(|t| t.id == stale_id));
        assert!(targets.iter().any(|t| t.kind == TargetKind::Personal));
        assert_eq!(repo.list_stale_targets(cutoff, 1).unwrap().len(), 1);
    }

    #[test]
    fn timed_out_targets_do_not_starve_stale_ones() {
        let repo = InMemoryRepo::new();
        let now = SystemTime::now();
        let mut old = link("old", Scope::Global, None, LinkStatus::Approved);
        old.health = LinkHealth {
            status: HealthStatus::Healthy,
            checked_at: Some(now - Duration::from_secs(200_000)),
            error: None,
        };
        let old_id = old.id;
        repo.insert_link(old).unwrap();
        for i in 0..health::SCAN_BATCH_SIZE {
            repo.insert_link(link(&format!("slow{i}"), Scope::Global, None, LinkStatus::Approved))
                .unwrap();
        }

        let cutoff = health::stale_cutoff(now, Duration::from_secs(86_400));
        let mut seen = false;
        for round in 0..2u64 {
            let batch = repo
                .list_stale_targets(cutoff, health::SCAN_BATCH_SIZE)
                .unwrap();
            assert_eq!(batch.len(), health::SCAN_BATCH_SIZE);
            seen |= batch.iter().any(|t| t.id == old_id);
            let at = now + Duration::from_secs(round);
            for t in &batch {
                let h = health::ProbeOutcome::TimedOut.into_health(at);
                repo.record_health(t.kind, t.id, &h, at).unwrap();
            }
        }
        assert!(seen, "stale link never scheduled");
    }

    #[test]
    fn promote_only_touches_mapped_moderators_in_org() {
        let repo = InMemoryRepo::new();
        let org = Uuid::new_v4();
        let mut m = user(Role::User, Some(org));
        m.oidc_mapped_role = Some(crate::MappedRole::Moderator);
        let mut outsider = user(Role::User, None);
        outsider.oidc_mapped_role = Some(crate::MappedRole::Moderator);
        let plain = user(Role::User, Some(org));
        for u in [&m, &outsider, &plain] {
            repo.lock().unwrap().users.insert(u.id, u.clone());
        }
        assert_eq!(repo.promote_org_moderators(org, SystemTime::now()).unwrap(), 1);
        assert_eq!(repo.get_user(m.id).unwrap().unwrap().role, Role::OrgMod);
        assert_eq!(repo.get_user(outsider.id).unwrap().unwrap().role, Role::User);
        assert_eq!(repo.get_user(plain.id).unwrap().unwrap().role, Role::User);
    }
}
