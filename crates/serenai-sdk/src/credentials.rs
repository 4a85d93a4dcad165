//! Bearer credential injected into the connection manager.
//!
//! The manager never looks the credential up on its own. It is handed a
//! [`watch::Receiver`] and re-runs its connect/disconnect decision every
//! time the value changes.

use std::fmt;

use tokio::sync::watch;

/// Bearer token issued by the authentication service.
///
/// The token is redacted from `Debug` output so it never ends up in logs.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw bearer token.
    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Owner of the current credential.
///
/// Plays the role of the application's authentication state: signing in
/// calls [`set`](Self::set), signing out calls [`clear`](Self::clear), and
/// every subscribed manager follows along.
#[derive(Debug)]
pub struct CredentialSource {
    tx: watch::Sender<Option<Credential>>,
}

impl CredentialSource {
    /// Create a source with an optional initial credential.
    pub fn new(initial: Option<Credential>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the credential. Subscribers are only notified when the
    /// value actually changes.
    pub fn set(&self, credential: Credential) {
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&credential) {
                false
            } else {
                *current = Some(credential);
                true
            }
        });
    }

    /// Remove the credential (sign-out).
    pub fn clear(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    /// The credential currently held, if any.
    pub fn current(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    /// A receiver to inject into a connection manager.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let cred = Credential::new("eyJhbGciOi.secret");
        assert_eq!(format!("{cred:?}"), "Credential(***)");
        assert_eq!(cred.bearer(), "eyJhbGciOi.secret");
    }

    #[test]
    fn set_same_value_does_not_notify() {
        let source = CredentialSource::new(Some(Credential::new("a")));
        let mut rx = source.subscribe();
        rx.borrow_and_update();

        source.set(Credential::new("a"));
        assert!(!rx.has_changed().unwrap());

        source.set(Credential::new("b"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(Credential::bearer), Some("b"));
    }

    #[test]
    fn clear_notifies_once() {
        let source = CredentialSource::new(Some(Credential::new("a")));
        let mut rx = source.subscribe();
        rx.borrow_and_update();

        source.clear();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());

        source.clear();
        assert!(!rx.has_changed().unwrap());
        assert!(source.current().is_none());
    }
}
