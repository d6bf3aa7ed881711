//! Shared-link offers between users.
//!
//! An offer is a pending proposal of a keyword and URL. Accepting it turns it
//! into a personal link of the recipient; declining or withdrawing drops it.
//! Quotas (five outgoing per sender, five incoming per recipient) are
//! enforced by the store on insert.

use std::sync::Arc;

use uuid::Uuid;

use crate::notify::{Notification, Notifier};
use crate::validate::validate_url;
use crate::{Clock, CoreError, Keyword, SharedLink, Store, User, UserLink};

#[derive(Clone, Debug)]
pub struct NewShare {
    pub recipient_id: Uuid,
    pub keyword: String,
    pub url: String,
    pub description: String,
}

pub struct Sharing<S: ?Sized, C: Clock> {
    store: Arc<S>,
    clock: C,
    notifier: Arc<dyn Notifier>,
    enabled: bool,
}

impl<S: Store + ?Sized, C: Clock> Sharing<S, C> {
    pub fn new(store: Arc<S>, clock: C, notifier: Arc<dyn Notifier>, enabled: bool) -> Self {
        Self {
            store,
            clock,
            notifier,
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

    pub fn offer(&self, sender: &User, input: NewShare) -> Result<SharedLink, CoreError> {
        self.ensure_enabled()?;
        let keyword = Keyword::parse(&input.keyword)?;
        validate_url(&input.url)?;
        if input.recipient_id == sender.id {
            return Err(CoreError::InvalidInput(
                "cannot share a link with yourself".into(),
            ));
        }
        if self.store.get_user(input.recipient_id)?.is_none() {
            return Err(CoreError::NotFound);
        }
        if self
            .store
            .find_user_link(input.recipient_id, keyword.as_str())?
            .is_some()
        {
            return Err(CoreError::RecipientHasKeyword);
        }
        let share = SharedLink {
            id: Uuid::new_v4(),
            sender_id: sender.id,
            recipient_id: input.recipient_id,
            keyword: keyword.as_str().to_string(),
            url: input.url.trim().to_string(),
            description: input.description,
            created_at: self.clock.now(),
        };
        self.store.insert_share(share.clone())?;
        self.notifier.notify(Notification::ShareOffered {
            share: share.clone(),
        });
        Ok(share)
    }

    pub fn incoming(&self, actor: &User) -> Result<Vec<SharedLink>, CoreError> {
        self.ensure_enabled()?;
        self.store.list_incoming_shares(actor.id)
    }

    pub fn outgoing(&self, actor: &User) -> Result<Vec<SharedLink>, CoreError> {
        self.ensure_enabled()?;
        self.store.list_outgoing_shares(actor.id)
    }

    fn addressed_to(&self, actor: &User, id: Uuid) -> Result<SharedLink, CoreError> {
        match self.store.get_share(id)? {
            Some(share) if share.recipient_id == actor.id => Ok(share),
            _ => Err(CoreError::NotFound),
        }
    }

    /// Create the recipient's personal link and drop the offer in one step.
    pub fn accept(&self, actor: &User, id: Uuid) -> Result<UserLink, CoreError> {
        self.ensure_enabled()?;
        let share = self.addressed_to(actor, id)?;
        let keyword = Keyword::parse(&share.keyword)?;
        let link = UserLink::new(
            actor.id,
            &keyword,
            share.url,
            share.description,
            self.clock.now(),
        );
        self.store.accept_share(id, link)
    }

    pub fn decline(&self, actor: &User, id: Uuid) -> Result<(), CoreError> {
        self.ensure_enabled()?;
        self.addressed_to(actor, id)?;
        self.store.delete_share(id)
    }

    pub fn withdraw(&self, actor: &User, id: Uuid) -> Result<(), CoreError> {
        self.ensure_enabled()?;
        match self.store.get_share(id)? {
            Some(share) if share.sender_id == actor.id => self.store.delete_share(id),
            _ => Err(CoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use crate::notify::tests::RecordingNotifier;
    use crate::{UpsertUser, UserLinkRepository, UserRepository};
    use std::time::SystemTime;

    struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    fn person(repo: &InMemoryRepo, sub: &str) -> User {
        repo.upsert_user(
            UpsertUser {
                sub: sub.into(),
                username: None,
                email: format!("{sub}@example.com"),
                name: sub.into(),
                picture: String::new(),
                organization_id: None,
                oidc_mapped_role: None,
                role: None,
            },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap()
    }

    fn share_to(recipient: &User, keyword: &str) -> NewShare {
        NewShare {
            recipient_id: recipient.id,
            keyword: keyword.into(),
            url: format!("https://{keyword}.example"),
            description: String::new(),
        }
    }

    fn setup() -> (
        Arc<InMemoryRepo>,
        Arc<RecordingNotifier>,
        Sharing<InMemoryRepo, TestClock>,
    ) {
        let repo = Arc::new(InMemoryRepo::new());
        let notes = Arc::new(RecordingNotifier::default());
        let svc = Sharing::new(repo.clone(), TestClock, notes.clone(), true);
        (repo, notes, svc)
    }

    #[test]
    fn share_quotas_and_duplicates() {
        let (repo, _, svc) = setup();
        let alice = person(&repo, "alice");
        let bob = person(&repo, "bob");
        let others: Vec<User> = (0..6).map(|i| person(&repo, &format!("u{i}"))).collect();

        for u in &others[..5] {
            svc.offer(&alice, share_to(u, "x")).unwrap();
        }
        assert_eq!(
            svc.offer(&alice, share_to(&others[5], "x")).unwrap_err(),
            CoreError::ShareLimitReached
        );

        for (i, u) in others[..5].iter().enumerate() {
            svc.offer(u, share_to(&bob, &format!("k{i}"))).unwrap();
        }
        assert_eq!(
            svc.offer(&others[5], share_to(&bob, "k9")).unwrap_err(),
            CoreError::RecipientLimitReached
        );

        let carol = person(&repo, "carol");
        let dave = person(&repo, "dave");
        svc.offer(&carol, share_to(&dave, "x")).unwrap();
        assert_eq!(
            svc.offer(&carol, share_to(&dave, "x")).unwrap_err(),
            CoreError::DuplicateShare
        );
    }

    #[test]
    fn accept_creates_personal_link_and_consumes_offer() {
        let (repo, notes, svc) = setup();
        let alice = person(&repo, "alice");
        let bob = person(&repo, "bob");
        let offer = svc.offer(&alice, share_to(&bob, "wiki")).unwrap();
        assert_eq!(notes.kinds(), vec!["share_offered"]);
        assert_eq!(svc.incoming(&bob).unwrap().len(), 1);
        assert_eq!(svc.outgoing(&alice).unwrap().len(), 1);

        assert_eq!(svc.accept(&alice, offer.id).unwrap_err(), CoreError::NotFound);
        let link = svc.accept(&bob, offer.id).unwrap();
        assert_eq!(link.user_id, bob.id);
        assert_eq!(link.url, "https://wiki.example");
        assert!(svc.incoming(&bob).unwrap().is_empty());
        assert!(repo.find_user_link(bob.id, "wiki").unwrap().is_some());
    }

    #[test]
    fn recipient_keyword_clash_is_reported() {
        let (repo, _, svc) = setup();
        let alice = person(&repo, "alice");
        let bob = person(&repo, "bob");
        let kw = Keyword::parse("wiki").unwrap();
        repo.insert_user_link(UserLink::new(bob.id, &kw, "https://b", "", SystemTime::UNIX_EPOCH))
            .unwrap();
        assert_eq!(
            svc.offer(&alice, share_to(&bob, "wiki")).unwrap_err(),
            CoreError::RecipientHasKeyword
        );
    }

    #[test]
    fn accept_after_recipient_created_keyword_conflicts() {
        let (repo, _, svc) = setup();
        let alice = person(&repo, "alice");
        let bob = person(&repo, "bob");
        let offer = svc.offer(&alice, share_to(&bob, "wiki")).unwrap();
        let kw = Keyword::parse("wiki").unwrap();
        repo.insert_user_link(UserLink::new(bob.id, &kw, "https://b", "", SystemTime::UNIX_EPOCH))
            .unwrap();
        assert_eq!(
            svc.accept(&bob, offer.id).unwrap_err(),
            CoreError::DuplicateKeyword
        );
        // offer survives the failed accept
        assert_eq!(svc.incoming(&bob).unwrap().len(), 1);
    }

    #[test]
    fn decline_and_withdraw() {
        let (repo, _, svc) = setup();
        let alice = person(&repo, "alice");
        let bob = person(&repo, "bob");
        let a = svc.offer(&alice, share_to(&bob, "a")).unwrap();
        let b = svc.offer(&alice, share_to(&bob, "b")).unwrap();
        assert_eq!(svc.decline(&alice, a.id).unwrap_err(), CoreError::NotFound);
        svc.decline(&bob, a.id).unwrap();
        assert_eq!(svc.withdraw(&bob, b.id).unwrap_err(), CoreError::NotFound);
        svc.withdraw(&alice, b.id).unwrap();
        assert!(svc.outgoing(&alice).unwrap().is_empty());
    }

    #[test]
    fn self_share_is_rejected() {
        let (repo, _, svc) = setup();
        let alice = person(&repo, "alice");
        assert!(matches!(
            svc.offer(&alice, share_to(&alice, "x")),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
