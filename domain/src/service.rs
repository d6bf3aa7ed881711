//! Link lifecycle and moderation.
//!
//! ```text
//! pending ──approve──▶ approved ──request deletion──▶ deletion_pending ──approve──▶ (deleted)
//!    │                    ▲                                  │
//!    └──reject──▶ rejected └──────────reject deletion────────┘
//! ```
//!
//! Every transition is checked against the authorization predicates first,
//! then applied by a guarded store call, then announced to the notifier.

use std::sync::Arc;

use uuid::Uuid;

use crate::authz::{can_manage, can_moderate, can_moderate_org, is_admin, is_global_mod};
use crate::notify::{Notification, Notifier};
use crate::validate::validate_url;
use crate::{
    Clock, CoreError, Keyword, Link, LinkEditRequest, LinkFilter, LinkHealth, LinkStatus,
    ModerationScope, RequestStatus, Role, Scope, Store, User,
};

/// Input for creating or submitting a link.
#[derive(Clone, Debug)]
pub struct NewLink {
    pub keyword: String,
    pub url: String,
    pub description: String,
    pub scope: Scope,
    /// Defaults to the actor's organization for org links.
    pub organization_id: Option<Uuid>,
}

/// Input for an edit request.
#[derive(Clone, Debug)]
pub struct NewEditRequest {
    pub url: String,
    pub description: String,
    pub reason: String,
}

pub struct LinkService<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
    notifier: Arc<dyn Notifier>,
    org_links_enabled: bool,
}

impl<S: Store + ?Sized, C: Clock> LinkService<S, C> {
    pub fn new(store: Arc<S>, clock: C, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            clock,
            notifier,
            org_links_enabled: true,
        }
    }

    pub fn with_org_links(mut self, enabled: bool) -> Self {
        self.org_links_enabled = enabled;
        self
    }

    fn load(&self, id: Uuid) -> Result<Link, CoreError> {
        self.store.get_link(id)?.ok_or(CoreError::NotFound)
    }

    fn moderated(&self, actor: &User, id: Uuid) -> Result<Link, CoreError> {
        let link = self.load(id)?;
        if !can_moderate(actor, &link) {
            return Err(CoreError::Forbidden);
        }
        Ok(link)
    }

    /// Create a link. Moderators of the target scope create it approved;
    /// everyone else submits it for review.
    pub fn create_link(&self, actor: &User, input: NewLink) -> Result<Link, CoreError> {
        let keyword = Keyword::parse(&input.keyword)?;
        validate_url(&input.url)?;

        let (organization_id, status) = match input.scope {
            Scope::Global => {
                let status = if is_global_mod(actor) {
                    LinkStatus::Approved
                } else {
                    LinkStatus::Pending
                };
                (None, status)
            }
            Scope::Org => {
                if !self.org_links_enabled {
                    return Err(CoreError::FeatureDisabled("organization links"));
                }
                let org = input
                    .organization_id
                    .or(actor.organization_id)
                    .ok_or_else(|| CoreError::InvalidInput("organization is required".into()))?;
                if self.store.get_organization(org)?.is_none() {
                    return Err(CoreError::NotFound);
                }
                let member = actor.organization_id == Some(org);
                let status = if is_admin(actor) || (actor.role == Role::OrgMod && member) {
                    LinkStatus::Approved
                } else if member || can_moderate_org(actor, org) {
                    LinkStatus::Pending
                } else {
                    return Err(CoreError::Forbidden);
                };
                (Some(org), status)
            }
        };

        let now = self.clock.now();
        let link = Link {
            id: Uuid::new_v4(),
            keyword: keyword.as_str().to_string(),
            url: input.url.trim().to_string(),
            description: input.description,
            scope: input.scope,
            organization_id,
            status,
            created_by: Some(actor.id),
            submitted_by: Some(actor.id),
            reviewed_by: None,
            reviewed_at: None,
            deletion_requested_by: None,
            deletion_reason: None,
            click_count: 0,
            health: LinkHealth::unknown(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_link(link.clone())?;

        if status == LinkStatus::Pending {
            self.notifier.notify(Notification::LinkSubmitted { link: link.clone() });
        }
        Ok(link)
    }

    pub fn get_link(&self, id: Uuid) -> Result<Link, CoreError> {
        self.load(id)
    }

    /// Approved global links plus approved links of the actor's organization.
    pub fn list_visible(&self, actor: Option<&User>) -> Result<Vec<Link>, CoreError> {
        let mut links = self.store.list_links(&LinkFilter {
            status: Some(LinkStatus::Approved),
            scope: Some(Scope::Global),
            ..LinkFilter::default()
        })?;
        if let Some(org) = actor
            .and_then(|a| a.organization_id)
            .filter(|_| self.org_links_enabled)
        {
            links.extend(self.store.list_links(&LinkFilter {
                status: Some(LinkStatus::Approved),
                scope: Some(Scope::Org),
                organization_id: Some(org),
                ..LinkFilter::default()
            })?);
        }
        Ok(links)
    }

    /// Links the actor created, in any status.
    pub fn list_mine(&self, actor: &User) -> Result<Vec<Link>, CoreError> {
        self.store.list_links(&LinkFilter {
            created_by: Some(actor.id),
            ..LinkFilter::default()
        })
    }

    pub fn approve(&self, actor: &User, id: Uuid) -> Result<Link, CoreError> {
        self.moderated(actor, id)?;
        let link = self.store.approve_link(id, actor.id, self.clock.now())?;
        self.notifier.notify(Notification::LinkApproved { link: link.clone() });
        Ok(link)
    }

    pub fn reject(&self, actor: &User, id: Uuid, reason: Option<String>) -> Result<Link, CoreError> {
        self.moderated(actor, id)?;
        let link = self.store.reject_link(id, actor.id, self.clock.now())?;
        self.notifier.notify(Notification::LinkRejected {
            link: link.clone(),
            reason,
        });
        Ok(link)
    }

    /// Direct edit by a moderator of the link's scope. A new URL resets health.
    pub fn update(
        &self,
        actor: &User,
        id: Uuid,
        url: &str,
        description: &str,
    ) -> Result<Link, CoreError> {
        let current = self.moderated(actor, id)?;
        validate_url(url)?;
        let url = url.trim();
        let reset = current.url != url;
        self.store
            .update_link_target(id, url, description, reset, self.clock.now())
    }

    pub fn request_deletion(&self, actor: &User, id: Uuid, reason: &str) -> Result<Link, CoreError> {
        let link = self.load(id)?;
        if !can_manage(actor, &link) {
            return Err(CoreError::Forbidden);
        }
        let link = self
            .store
            .mark_deletion_pending(id, actor.id, reason.trim(), self.clock.now())?;
        self.notifier.notify(Notification::DeletionRequested {
            link: link.clone(),
            requested_by: actor.id,
        });
        Ok(link)
    }

    /// Hard-deletes the link.
    pub fn approve_deletion(&self, actor: &User, id: Uuid) -> Result<Link, CoreError> {
        self.moderated(actor, id)?;
        let link = self.store.delete_link(id, Some(LinkStatus::DeletionPending))?;
        self.notifier.notify(Notification::LinkDeleted { link: link.clone() });
        Ok(link)
    }

    /// Back to `approved`.
    pub fn reject_deletion(&self, actor: &User, id: Uuid) -> Result<Link, CoreError> {
        self.moderated(actor, id)?;
        self.store.restore_link(id, self.clock.now())
    }

    /// Admins delete anything; submitters may withdraw their own pending link.
    pub fn delete(&self, actor: &User, id: Uuid) -> Result<(), CoreError> {
        let link = self.load(id)?;
        let expected = if is_admin(actor) {
            None
        } else if link.status == LinkStatus::Pending && link.submitted_by == Some(actor.id) {
            Some(LinkStatus::Pending)
        } else {
            return Err(CoreError::Forbidden);
        };
        let deleted = self.store.delete_link(id, expected)?;
        if deleted.created_by != Some(actor.id) {
            self.notifier.notify(Notification::LinkDeleted { link: deleted });
        }
        Ok(())
    }

    pub fn create_edit_request(
        &self,
        actor: &User,
        link_id: Uuid,
        input: NewEditRequest,
    ) -> Result<LinkEditRequest, CoreError> {
        let link = self.load(link_id)?;
        if link.status != LinkStatus::Approved {
            return Err(CoreError::InvalidInput(
                "only approved links can be edited".into(),
            ));
        }
        validate_url(&input.url)?;
        let req = LinkEditRequest {
            id: Uuid::new_v4(),
            link_id,
            user_id: actor.id,
            url: input.url.trim().to_string(),
            description: input.description,
            reason: input.reason,
            status: RequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: self.clock.now(),
        };
        self.store.insert_edit_request(req.clone())?;
        Ok(req)
    }

    fn edit_request_for_moderation(
        &self,
        actor: &User,
        id: Uuid,
    ) -> Result<LinkEditRequest, CoreError> {
        let req = self.store.get_edit_request(id)?.ok_or(CoreError::NotFound)?;
        self.moderated(actor, req.link_id)?;
        Ok(req)
    }

    /// Applies the request to the link atomically and resets its health.
    pub fn approve_edit_request(
        &self,
        actor: &User,
        id: Uuid,
    ) -> Result<(LinkEditRequest, Link), CoreError> {
        self.edit_request_for_moderation(actor, id)?;
        let (req, link) = self
            .store
            .approve_edit_request(id, actor.id, self.clock.now())?;
        self.notifier.notify(Notification::EditRequestApproved {
            request: req.clone(),
            link: link.clone(),
        });
        Ok((req, link))
    }

    pub fn reject_edit_request(&self, actor: &User, id: Uuid) -> Result<LinkEditRequest, CoreError> {
        self.edit_request_for_moderation(actor, id)?;
        let req = self
            .store
            .reject_edit_request(id, actor.id, self.clock.now())?;
        if let Some(link) = self.store.get_link(req.link_id)? {
            self.notifier.notify(Notification::EditRequestRejected {
                request: req.clone(),
                link,
            });
        }
        Ok(req)
    }

    fn moderation_scope(actor: &User) -> Result<ModerationScope, CoreError> {
        if is_global_mod(actor) {
            return Ok(ModerationScope::All);
        }
        match (actor.role, actor.organization_id) {
            (Role::OrgMod, Some(org)) => Ok(ModerationScope::Organization(org)),
            _ => Err(CoreError::Forbidden),
        }
    }

    fn queue(&self, actor: &User, status: LinkStatus) -> Result<Vec<Link>, CoreError> {
        let filter = match Self::moderation_scope(actor)? {
            ModerationScope::All => LinkFilter {
                status: Some(status),
                ..LinkFilter::default()
            },
            ModerationScope::Organization(org) => LinkFilter {
                status: Some(status),
                scope: Some(Scope::Org),
                organization_id: Some(org),
                ..LinkFilter::default()
            },
        };
        self.store.list_links(&filter)
    }

    pub fn pending_links(&self, actor: &User) -> Result<Vec<Link>, CoreError> {
        self.queue(actor, LinkStatus::Pending)
    }

    pub fn pending_deletions(&self, actor: &User) -> Result<Vec<Link>, CoreError> {
        self.queue(actor, LinkStatus::DeletionPending)
    }

    pub fn pending_edit_requests(&self, actor: &User) -> Result<Vec<LinkEditRequest>, CoreError> {
        let scope = Self::moderation_scope(actor)?;
        self.store.list_pending_edit_requests(scope)
    }
}
