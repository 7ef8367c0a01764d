// crates/jobs/src/identity.rs
//! Ambient session identity.

use tokio::sync::watch;

use datadict_types::UserId;

/// Who is signed in, and a way to hear about sign-in / sign-out.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, `None` when there is no session.
    fn current(&self) -> Option<UserId>;

    /// Receiver that is notified whenever the identity changes.
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

/// Identity backed by a watch channel; the hosting application calls
/// [`SessionIdentity::sign_in`] / [`SessionIdentity::sign_out`].
#[derive(Debug)]
pub struct SessionIdentity {
    tx: watch::Sender<Option<UserId>>,
}

impl SessionIdentity {
    pub fn new(initial: Option<UserId>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        Self::new(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        let user_id = user_id.into();
        tracing::debug!(user_id = %user_id, "session signed in");
        self.tx.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        tracing::debug!("session signed out");
        self.tx.send_replace(None);
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
