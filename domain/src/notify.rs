//! Notification hooks fired after a committed transition.
//!
//! Implementations must not block and must swallow their own failures; the
//! services call `notify` and move on.

use uuid::Uuid;

use crate::{Link, LinkEditRequest, SharedLink};

/// A link that went unhealthy during a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnhealthyLink {
    pub id: Uuid,
    pub keyword: String,
    pub url: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// To the moderators of the link's scope.
    LinkSubmitted { link: Link },
    /// To the creator.
    LinkApproved { link: Link },
    /// To the creator, with the moderator's reason.
    LinkRejected { link: Link, reason: Option<String> },
    /// To the creator.
    LinkDeleted { link: Link },
    /// To the moderators of the link's scope.
    DeletionRequested { link: Link, requested_by: Uuid },
    /// To the requester.
    EditRequestApproved { request: LinkEditRequest, link: Link },
    /// To the requester.
    EditRequestRejected { request: LinkEditRequest, link: Link },
    /// To the recipient.
    ShareOffered { share: SharedLink },
    /// To global moderators, once per scan.
    LinksUnhealthy { links: Vec<UnhealthyLink> },
}

impl Notification {
    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::LinkSubmitted { .. } => "link_submitted",
            Notification::LinkApproved { .. } => "link_approved",
            Notification::LinkRejected { .. } => "link_rejected",
            Notification::LinkDeleted { .. } => "link_deleted",
            Notification::DeletionRequested { .. } => "deletion_requested",
            Notification::EditRequestApproved { .. } => "edit_request_approved",
            Notification::EditRequestRejected { .. } => "edit_request_rejected",
            Notification::ShareOffered { .. } => "share_offered",
            Notification::LinksUnhealthy { .. } => "links_unhealthy",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: Notification);
}

/// Used when email is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: Notification) {}
}
