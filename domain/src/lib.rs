//! Domain library for the go-links service.
//!
//! Holds the entities (organizations, users, links, personal links, edit
//! requests, share offers, fallback redirects, lookup counters), the ports
//! (repository traits) adapters implement, and the error taxonomy. The
//! services built on top of the ports live in the submodules. Keep adapters
//! and IO concerns out of this crate.

use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::Serialize;
use uuid::Uuid;

/// Maximum combined pending edit + deletion requests a single user may hold.
pub const MAX_PENDING_REQUESTS: usize = 5;
/// Maximum outgoing share offers per sender.
pub const MAX_OUTGOING_SHARES: usize = 5;
/// Maximum incoming share offers per recipient.
pub const MAX_INCOMING_SHARES: usize = 5;
/// Number of "did you mean" suggestions rendered on a miss.
pub const SUGGESTION_LIMIT: usize = 5;

/// A validated, lowercase keyword.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keyword(String);

impl Keyword {
    /// Validate and normalize a raw keyword.
    pub fn parse<S: AsRef<str>>(s: S) -> Result<Self, CoreError> {
        validate::validate_keyword(s.as_ref())?;
        Ok(Self(validate::normalize_keyword(s.as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role lattice: `user < org_mod < global_mod < admin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    OrgMod,
    GlobalMod,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::OrgMod => "org_mod",
            Role::GlobalMod => "global_mod",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "org_mod" => Some(Role::OrgMod),
            "global_mod" => Some(Role::GlobalMod),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Role derived from identity-provider groups before org membership is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappedRole {
    User,
    Moderator,
    Admin,
}

impl MappedRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappedRole::User => "user",
            MappedRole::Moderator => "moderator",
            MappedRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(MappedRole::User),
            "moderator" => Some(MappedRole::Moderator),
            "admin" => Some(MappedRole::Admin),
            _ => None,
        }
    }
}

/// Visibility tier of a shared (non-personal) link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Org,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Org => "org",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "global" => Some(Scope::Global),
            "org" => Some(Scope::Org),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Approved,
    Rejected,
    DeletionPending,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Approved => "approved",
            LinkStatus::Rejected => "rejected",
            LinkStatus::DeletionPending => "deletion_pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(LinkStatus::Pending),
            "approved" => Some(LinkStatus::Approved),
            "rejected" => Some(LinkStatus::Rejected),
            "deletion_pending" => Some(LinkStatus::DeletionPending),
            _ => None,
        }
    }

    /// Statuses that hold a keyword within its scope.
    pub fn holds_keyword(&self) -> bool {
        !matches!(self, LinkStatus::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Some(HealthStatus::Unknown),
            "healthy" => Some(HealthStatus::Healthy),
            "unhealthy" => Some(HealthStatus::Unhealthy),
            _ => None,
        }
    }
}

/// Status of an edit request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// Which tier a resolution came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Personal,
    Org,
    Global,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::Personal => "personal",
            LinkSource::Org => "org",
            LinkSource::Global => "global",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(LinkSource::Personal),
            "org" => Some(LinkSource::Org),
            "global" => Some(LinkSource::Global),
            _ => None,
        }
    }
}

/// Outcome tag of a keyword lookup, used by the pre-aggregated counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOutcome {
    Resolved,
    Fallback,
    NotFound,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Resolved => "resolved",
            LookupOutcome::Fallback => "fallback",
            LookupOutcome::NotFound => "not_found",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolved" => Some(LookupOutcome::Resolved),
            "fallback" => Some(LookupOutcome::Fallback),
            "not_found" => Some(LookupOutcome::NotFound),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Organization {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub fallback_redirect_url: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Organization {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            fallback_redirect_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// OIDC subject; unique.
    pub sub: String,
    pub username: Option<String>,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub role: Role,
    pub organization_id: Option<Uuid>,
    pub oidc_mapped_role: Option<MappedRole>,
    pub fallback_redirect_id: Option<Uuid>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Fields written on every login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertUser {
    pub sub: String,
    pub username: Option<String>,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub organization_id: Option<Uuid>,
    pub oidc_mapped_role: Option<MappedRole>,
    /// `Some` overwrites the stored role; `None` keeps it (new users start as `user`).
    pub role: Option<Role>,
}

/// Liveness of a link target. `checked_at` is `None` iff `status` is `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkHealth {
    pub status: HealthStatus,
    pub checked_at: Option<SystemTime>,
    pub error: Option<String>,
}

impl LinkHealth {
    pub fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            checked_at: None,
            error: None,
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A global or organization link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub id: Uuid,
    pub keyword: String,
    pub url: String,
    pub description: String,
    pub scope: Scope,
    /// Set iff `scope` is `Org`.
    pub organization_id: Option<Uuid>,
    pub status: LinkStatus,
    pub created_by: Option<Uuid>,
    pub submitted_by: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<SystemTime>,
    pub deletion_requested_by: Option<Uuid>,
    pub deletion_reason: Option<String>,
    pub click_count: u64,
    pub health: LinkHealth,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// A personal link owned by a single user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub keyword: String,
    pub url: String,
    pub description: String,
    pub click_count: u64,
    pub health: LinkHealth,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl UserLink {
    pub fn new(
        user_id: Uuid,
        keyword: &Keyword,
        url: impl Into<String>,
        description: impl Into<String>,
        now: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            keyword: keyword.as_str().to_string(),
            url: url.into(),
            description: description.into(),
            click_count: 0,
            health: LinkHealth::unknown(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEditRequest {
    pub id: Uuid,
    pub link_id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub description: String,
    pub reason: String,
    pub status: RequestStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<SystemTime>,
    pub created_at: SystemTime,
}

/// A pending offer of a personal link from one user to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedLink {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub keyword: String,
    pub url: String,
    pub description: String,
    pub created_at: SystemTime,
}

/// URL prefix a user can opt into for keyword misses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackRedirect {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: SystemTime,
}

/// Pre-aggregated lookup counter row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordLookup {
    pub keyword: String,
    pub outcome: LookupOutcome,
    pub count: u64,
    pub last_seen_at: SystemTime,
}

/// The winning link of a resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub link_id: Uuid,
    pub keyword: String,
    pub url: String,
    pub source: LinkSource,
}

/// Which moderation queue a moderator may see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModerationScope {
    /// Global moderators and admins see every queue item.
    All,
    /// Org moderators see their own organization's items only.
    Organization(Uuid),
}

/// Filter for listing global/org links.
#[derive(Clone, Debug, Default)]
pub struct LinkFilter {
    pub status: Option<LinkStatus>,
    pub scope: Option<Scope>,
    pub organization_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub limit: usize,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Repository port for organizations.
pub trait OrganizationRepository: Send + Sync {
    fn get_organization(&self, id: Uuid) -> Result<Option<Organization>, CoreError>;
    fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, CoreError>;
    /// Insert a new organization; `AlreadyExists` on a duplicate slug.
    fn create_organization(&self, org: Organization) -> Result<(), CoreError>;
    fn list_organizations(&self) -> Result<Vec<Organization>, CoreError>;
    fn set_organization_fallback_url(
        &self,
        id: Uuid,
        url: Option<&str>,
        now: SystemTime,
    ) -> Result<(), CoreError>;
}

/// Repository port for users.
pub trait UserRepository: Send + Sync {
    fn get_user(&self, id: Uuid) -> Result<Option<User>, CoreError>;
    fn get_user_by_sub(&self, sub: &str) -> Result<Option<User>, CoreError>;
    /// Case-insensitive email match.
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;
    /// Insert or update by `sub`, returning the stored row.
    fn upsert_user(&self, input: UpsertUser, now: SystemTime) -> Result<User, CoreError>;
    fn set_user_role(&self, id: Uuid, role: Role, now: SystemTime) -> Result<(), CoreError>;
    fn set_user_fallback(
        &self,
        id: Uuid,
        fallback_id: Option<Uuid>,
        now: SystemTime,
    ) -> Result<(), CoreError>;
    /// Global moderators and admins, plus org moderators of `organization_id` when given.
    fn list_moderators(&self, organization_id: Option<Uuid>) -> Result<Vec<User>, CoreError>;
    /// Upgrade every `user` in the org whose mapped role is `moderator` to `org_mod`.
    fn promote_org_moderators(
        &self,
        organization_id: Uuid,
        now: SystemTime,
    ) -> Result<usize, CoreError>;
}

/// Repository port for global and organization links.
///
/// Transition methods are guarded on the expected current status and return
/// `NotFound` when the row no longer matches.
pub trait LinkRepository: Send + Sync {
    fn get_link(&self, id: Uuid) -> Result<Option<Link>, CoreError>;
    /// Insert a link; `DuplicateKeyword` if the keyword is held in its scope.
    fn insert_link(&self, link: Link) -> Result<(), CoreError>;
    /// Replace url/description; when `reset_health` the health fields are cleared.
    fn update_link_target(
        &self,
        id: Uuid,
        url: &str,
        description: &str,
        reset_health: bool,
        now: SystemTime,
    ) -> Result<Link, CoreError>;
    /// `pending -> approved`.
    fn approve_link(&self, id: Uuid, reviewer: Uuid, now: SystemTime) -> Result<Link, CoreError>;
    /// `pending -> rejected`.
    fn reject_link(&self, id: Uuid, reviewer: Uuid, now: SystemTime) -> Result<Link, CoreError>;
    /// `approved -> deletion_pending`; `PendingRequestLimit` when the requester is at quota.
    fn mark_deletion_pending(
        &self,
        id: Uuid,
        requester: Uuid,
        reason: &str,
        now: SystemTime,
    ) -> Result<Link, CoreError>;
    /// `deletion_pending -> approved`.
    fn restore_link(&self, id: Uuid, now: SystemTime) -> Result<Link, CoreError>;
    /// Hard delete, optionally only when the row is in `expected` status.
    fn delete_link(&self, id: Uuid, expected: Option<LinkStatus>) -> Result<Link, CoreError>;
    fn list_links(&self, filter: &LinkFilter) -> Result<Vec<Link>, CoreError>;
    fn increment_link_clicks(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Repository port for personal links.
pub trait UserLinkRepository: Send + Sync {
    fn get_user_link(&self, id: Uuid) -> Result<Option<UserLink>, CoreError>;
    fn find_user_link(&self, user_id: Uuid, keyword: &str) -> Result<Option<UserLink>, CoreError>;
    /// `DuplicateKeyword` when the user already owns the keyword.
    fn insert_user_link(&self, link: UserLink) -> Result<(), CoreError>;
    fn update_user_link(
        &self,
        id: Uuid,
        url: &str,
        description: &str,
        reset_health: bool,
        now: SystemTime,
    ) -> Result<UserLink, CoreError>;
    fn delete_user_link(&self, id: Uuid) -> Result<(), CoreError>;
    fn list_user_links(&self, user_id: Uuid) -> Result<Vec<UserLink>, CoreError>;
    fn increment_user_link_clicks(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Repository port for edit requests.
pub trait EditRequestRepository: Send + Sync {
    /// Insert a pending request. Enforces one pending per `(link, user)`
    /// (`DuplicateEditRequest`) and the combined per-user quota (`PendingRequestLimit`).
    fn insert_edit_request(&self, req: LinkEditRequest) -> Result<(), CoreError>;
    fn get_edit_request(&self, id: Uuid) -> Result<Option<LinkEditRequest>, CoreError>;
    fn list_pending_edit_requests(
        &self,
        scope: ModerationScope,
    ) -> Result<Vec<LinkEditRequest>, CoreError>;
    /// Atomically mark the request approved and apply it to the link (resetting health).
    fn approve_edit_request(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: SystemTime,
    ) -> Result<(LinkEditRequest, Link), CoreError>;
    fn reject_edit_request(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: SystemTime,
    ) -> Result<LinkEditRequest, CoreError>;
    /// Pending edit requests plus pending deletion requests of the user.
    fn count_pending_requests(&self, user_id: Uuid) -> Result<usize, CoreError>;
}

/// Repository port for share offers.
pub trait ShareRepository: Send + Sync {
    /// Enforces sender/recipient quotas and `(sender, recipient, keyword)` uniqueness.
    fn insert_share(&self, share: SharedLink) -> Result<(), CoreError>;
    fn get_share(&self, id: Uuid) -> Result<Option<SharedLink>, CoreError>;
    fn list_incoming_shares(&self, recipient_id: Uuid) -> Result<Vec<SharedLink>, CoreError>;
    fn list_outgoing_shares(&self, sender_id: Uuid) -> Result<Vec<SharedLink>, CoreError>;
    /// Atomically create the recipient's personal link and delete the offer.
    fn accept_share(&self, id: Uuid, link: UserLink) -> Result<UserLink, CoreError>;
    fn delete_share(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Repository port for fallback redirect options.
pub trait FallbackRepository: Send + Sync {
    fn insert_fallback(&self, fallback: FallbackRedirect) -> Result<(), CoreError>;
    fn get_fallback(&self, id: Uuid) -> Result<Option<FallbackRedirect>, CoreError>;
    fn list_fallbacks(&self, organization_id: Uuid) -> Result<Vec<FallbackRedirect>, CoreError>;
    /// Delete the option; users referencing it have their selection cleared.
    fn delete_fallback(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Lookup queries backing the resolver.
pub trait ResolveRepository: Send + Sync {
    /// Priority-ordered single lookup: personal, then org (approved), then global (approved).
    fn resolve_keyword(
        &self,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        keyword: &str,
    ) -> Result<Option<Resolution>, CoreError>;
    /// Keywords visible to the caller ordered by trigram similarity.
    fn similar_keywords(
        &self,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError>;
    /// A uniformly random approved global or org link.
    fn random_link(&self, organization_id: Option<Uuid>) -> Result<Option<Resolution>, CoreError>;
}

/// Repository port for the health scanner.
pub trait HealthRepository: Send + Sync {
    /// Approved links and personal links never checked or checked before
    /// `cutoff`, least recently attempted first (never attempted leads).
    fn list_stale_targets(
        &self,
        cutoff: SystemTime,
        limit: usize,
    ) -> Result<Vec<health::HealthTarget>, CoreError>;
    fn get_health_target(&self, id: Uuid) -> Result<Option<health::HealthTarget>, CoreError>;
    /// Store a health check result. `attempted_at` is recorded even when the
    /// result carries no `checked_at` (timeouts).
    fn record_health(
        &self,
        kind: health::TargetKind,
        id: Uuid,
        health: &LinkHealth,
        attempted_at: SystemTime,
    ) -> Result<(), CoreError>;
}

/// Repository port for the lookup counters.
pub trait LookupRepository: Send + Sync {
    /// Upsert-increment the `(keyword, outcome)` counter.
    fn record_lookup(
        &self,
        keyword: &str,
        outcome: LookupOutcome,
        now: SystemTime,
    ) -> Result<(), CoreError>;
    fn list_lookups(&self) -> Result<Vec<KeywordLookup>, CoreError>;
}

/// Every port a backing store provides.
pub trait Store:
    OrganizationRepository
    + UserRepository
    + LinkRepository
    + UserLinkRepository
    + EditRequestRepository
    + ShareRepository
    + FallbackRepository
    + ResolveRepository
    + HealthRepository
    + LookupRepository
{
    /// Cheap connectivity check for readiness probes.
    fn ping(&self) -> Result<(), CoreError>;
}

/// Core domain errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("resource already exists")]
    AlreadyExists,
    #[error("keyword already exists")]
    DuplicateKeyword,
    #[error("this keyword has already been shared with that user")]
    DuplicateShare,
    #[error("you already have a pending edit request for this link")]
    DuplicateEditRequest,
    #[error("you have reached the limit of {MAX_OUTGOING_SHARES} pending shares; wait for recipients to respond")]
    ShareLimitReached,
    #[error("the recipient has too many pending shares; try again later")]
    RecipientLimitReached,
    #[error("you have reached the limit of {MAX_PENDING_REQUESTS} pending requests; wait for a moderator to review them")]
    PendingRequestLimit,
    #[error("the recipient already has a personal link with this keyword")]
    RecipientHasKeyword,
    #[error("authentication required")]
    Unauthorized,
    #[error("access denied")]
    Forbidden,
    #[error("invalid keyword: {0}")]
    InvalidKeyword(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} are disabled")]
    FeatureDisabled(&'static str),
    #[error("repository error: {0}")]
    Repository(String),
}

pub mod adapters;
pub mod admin;
pub mod authz;
pub mod fallback;
pub mod health;
pub mod notify;
pub mod personal;
pub mod resolver;
pub mod role_sync;
pub mod service;
pub mod sharing;
pub mod similarity;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_parse_normalizes_case() {
        let k = Keyword::parse("Go-Docs_2").expect("valid keyword");
        assert_eq!(k.as_str(), "go-docs_2");
    }

    #[test]
    fn keyword_rejects_empty() {
        let err = Keyword::parse("").unwrap_err();
        assert!(matches!(err, CoreError::InvalidKeyword(_)));
    }

    #[test]
    fn role_lattice_is_ordered() {
        assert!(Role::User < Role::OrgMod);
        assert!(Role::OrgMod < Role::GlobalMod);
        assert!(Role::GlobalMod < Role::Admin);
    }

    #[test]
    fn enums_parse_their_own_strings() {
        for role in [Role::User, Role::OrgMod, Role::GlobalMod, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        for status in [
            LinkStatus::Pending,
            LinkStatus::Approved,
            LinkStatus::Rejected,
            LinkStatus::DeletionPending,
        ] {
            assert_eq!(LinkStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LookupOutcome::parse("not_found"), Some(LookupOutcome::NotFound));
        assert_eq!(Scope::parse("ORG"), Some(Scope::Org));
        assert_eq!(MappedRole::parse("bogus"), None);
    }

    #[test]
    fn rejected_links_release_their_keyword() {
        assert!(LinkStatus::Pending.holds_keyword());
        assert!(LinkStatus::DeletionPending.holds_keyword());
        assert!(!LinkStatus::Rejected.holds_keyword());
    }
}
