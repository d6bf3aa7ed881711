//! Email notifications.
//!
//! `EmailNotifier` resolves the recipients of an event from the store,
//! renders a plain-text message and hands it to a [`MailTransport`] on a
//! spawned task. Nothing here ever fails a request: delivery problems are
//! logged and dropped.

use std::sync::Arc;

use domain::notify::{Notification, Notifier};
use domain::{CoreError, Link, Role, Scope, Store, User, UserRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SmtpSettings;

/// One rendered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivers rendered messages.
pub trait MailTransport: Send + Sync {
    fn send(&self, from: &str, mail: &OutgoingMail) -> Result<(), String>;
}

/// Writes messages to the log instead of a mail server.
pub struct LogTransport {
    relay: String,
    username: Option<String>,
}

impl LogTransport {
    pub fn new(smtp: &SmtpSettings) -> Self {
        Self {
            relay: format!("{}:{}", smtp.host, smtp.port),
            username: smtp.username.clone(),
        }
    }
}

impl MailTransport for LogTransport {
    fn send(&self, from: &str, mail: &OutgoingMail) -> Result<(), String> {
        info!(
            relay = %self.relay,
            username = self.username.as_deref().unwrap_or("-"),
            %from,
            to = %mail.to.join(", "),
            subject = %mail.subject,
            "email"
        );
        debug!(body = %mail.body, "email body");
        Ok(())
    }
}

struct Inner {
    store: Arc<dyn Store>,
    transport: Arc<dyn MailTransport>,
    from: String,
    base_url: String,
}

#[derive(Clone)]
pub struct EmailNotifier {
    inner: Arc<Inner>,
}

impl EmailNotifier {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn MailTransport>,
        from: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                from: from.into(),
                base_url: base_url.into(),
            }),
        }
    }

    /// Resolve, render and send one event synchronously.
    pub fn deliver(&self, event: &Notification) -> Result<(), String> {
        let inner = &self.inner;
        let to = recipients(inner.store.as_ref(), event).map_err(|e| e.to_string())?;
        if to.is_empty() {
            debug!(kind = event.kind(), "no recipients with an email address");
            return Ok(());
        }
        let (subject, body) = render(event, &inner.base_url);
        inner
            .transport
            .send(&inner.from, &OutgoingMail { to, subject, body })
    }
}

impl Notifier for EmailNotifier {
    fn notify(&self, event: Notification) {
        let this = self.clone();
        let run = move || {
            if let Err(e) = this.deliver(&event) {
                warn!(kind = event.kind(), err = %e, "email notification failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(run);
            }
            Err(_) => run(),
        }
    }
}

fn emails(users: impl IntoIterator<Item = User>) -> Vec<String> {
    let mut out: Vec<String> = users
        .into_iter()
        .map(|u| u.email)
        .filter(|e| !e.trim().is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn user_email(store: &dyn Store, id: Option<Uuid>) -> Result<Vec<String>, CoreError> {
    match id {
        Some(id) => Ok(emails(store.get_user(id)?)),
        None => Ok(Vec::new()),
    }
}

fn scope_moderators(store: &dyn Store, link: &Link) -> Result<Vec<String>, CoreError> {
    let org = match link.scope {
        Scope::Org => link.organization_id,
        Scope::Global => None,
    };
    Ok(emails(store.list_moderators(org)?))
}

/// Email addresses an event is addressed to.
pub fn recipients(store: &dyn Store, event: &Notification) -> Result<Vec<String>, CoreError> {
    match event {
        Notification::LinkSubmitted { link } | Notification::DeletionRequested { link, .. } => {
            scope_moderators(store, link)
        }
        Notification::LinkApproved { link }
        | Notification::LinkRejected { link, .. }
        | Notification::LinkDeleted { link } => {
            user_email(store, link.submitted_by.or(link.created_by))
        }
        Notification::EditRequestApproved { request, .. }
        | Notification::EditRequestRejected { request, .. } => {
            user_email(store, Some(request.user_id))
        }
        Notification::ShareOffered { share } => user_email(store, Some(share.recipient_id)),
        Notification::LinksUnhealthy { .. } => Ok(emails(
            store
                .list_moderators(None)?
                .into_iter()
                .filter(|u| u.role >= Role::GlobalMod),
        )),
    }
}

/// Subject and plain-text body.
pub fn render(event: &Notification, base_url: &str) -> (String, String) {
    match event {
        Notification::LinkSubmitted { link } => (
            format!("[go] New link awaiting review: {}", link.keyword),
            format!(
                "A new {} link was submitted.\n\nKeyword: {}\nURL: {}\nDescription: {}\n\nReview it at {}/moderation\n",
                link.scope.as_str(),
                link.keyword,
                link.url,
                link.description,
                base_url
            ),
        ),
        Notification::LinkApproved { link } => (
            format!("[go] Your link go/{} was approved", link.keyword),
            format!(
                "Your link is live.\n\n{}/go/{} -> {}\n",
                base_url, link.keyword, link.url
            ),
        ),
        Notification::LinkRejected { link, reason } => (
            format!("[go] Your link go/{} was rejected", link.keyword),
            format!(
                "Your submission of go/{} -> {} was rejected.\n{}",
                link.keyword,
                link.url,
                reason
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .map(|r| format!("\nReason: {r}\n"))
                    .unwrap_or_default()
            ),
        ),
        Notification::LinkDeleted { link } => (
            format!("[go] Your link go/{} was deleted", link.keyword),
            format!("The link go/{} -> {} has been removed.\n", link.keyword, link.url),
        ),
        Notification::DeletionRequested { link, .. } => (
            format!("[go] Deletion requested: {}", link.keyword),
            format!(
                "Someone asked to delete go/{} -> {}.\nReason: {}\n\nReview it at {}/moderation\n",
                link.keyword,
                link.url,
                link.deletion_reason.as_deref().unwrap_or(""),
                base_url
            ),
        ),
        Notification::EditRequestApproved { link, .. } => (
            format!("[go] Your edit to go/{} was approved", link.keyword),
            format!("go/{} now points to {}.\n", link.keyword, link.url),
        ),
        Notification::EditRequestRejected { request, link } => (
            format!("[go] Your edit to go/{} was rejected", link.keyword),
            format!(
                "Your request to point go/{} at {} was rejected.\n",
                link.keyword, request.url
            ),
        ),
        Notification::ShareOffered { share } => (
            format!("[go] A link was shared with you: {}", share.keyword),
            format!(
                "You were offered a personal link.\n\nKeyword: {}\nURL: {}\n\nAccept or decline it at {}/shares\n",
                share.keyword, share.url, base_url
            ),
        ),
        Notification::LinksUnhealthy { links } => {
            let mut body = format!("{} link(s) failed their health check:\n\n", links.len());
            for l in links {
                body.push_str(&format!(
                    "- go/{} -> {} ({})\n",
                    l.keyword,
                    l.url,
                    l.error.as_deref().unwrap_or("unreachable")
                ));
            }
            (
                format!("[go] {} unhealthy link(s)", links.len()),
                body,
            )
        }
    }
}
