//! Identity provider contract.
//!
//! The board only needs to know who is signed in (to stamp `createdBy`) and
//! to hear about session changes. Everything else about authentication lives
//! with the provider.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::UserIdentity;

/// Source of the signed-in user.
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in user, if any.
    fn current_user(&self) -> Option<UserIdentity>;

    /// Returns a receiver that sees every sign-in and sign-out.
    ///
    /// The receiver starts out holding the current value.
    fn on_auth_change(&self) -> watch::Receiver<Option<UserIdentity>>;
}

/// In-process identity provider driven by explicit `sign_in`/`sign_out`.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    sender: Arc<watch::Sender<Option<UserIdentity>>>,
}

impl SessionIdentity {
    /// Creates a provider with nobody signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        let (sender, _receiver) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Creates a provider with `user` signed in.
    #[must_use]
    pub fn signed_in(user: UserIdentity) -> Self {
        let provider = Self::anonymous();
        provider.sign_in(user);
        provider
    }

    /// Signs `user` in, replacing any previous session.
    pub fn sign_in(&self, user: UserIdentity) {
        tracing::info!(uid = %user.uid, "User signed in");
        self.sender.send_replace(Some(user));
    }

    /// Ends the current session.
    pub fn sign_out(&self) {
        if let Some(previous) = self.sender.send_replace(None) {
            tracing::info!(uid = %previous.uid, "User signed out");
        }
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.sender.borrow().clone()
    }

    fn on_auth_change(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_anonymous_has_no_user() {
        assert!(SessionIdentity::anonymous().current_user().is_none());
    }

    #[rstest]
    fn test_sign_in_and_out() {
        let provider = SessionIdentity::anonymous();
        provider.sign_in(UserIdentity::new("uid-1"));
        assert_eq!(provider.current_user().map(|user| user.uid), Some("uid-1".to_string()));
        provider.sign_out();
        assert!(provider.current_user().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_auth_changes_are_observed() {
        let provider = SessionIdentity::anonymous();
        let mut changes = provider.on_auth_change();
        assert!(changes.borrow_and_update().is_none());

        provider.sign_in(UserIdentity::new("uid-2"));
        changes.changed().await.unwrap();
        assert_eq!(
            changes.borrow_and_update().as_ref().map(|user| user.uid.clone()),
            Some("uid-2".to_string())
        );
    }
}
