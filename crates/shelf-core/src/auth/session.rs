//! The active identity and the operations that change it.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use super::{AuthError, AuthResult, Credential, Identity, IdentityProvider, SessionPersistence};

/// Observable summary of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub loading: bool,
    /// Email of a permanent identity
    pub owner_label: Option<String>,
    pub last_error: Option<String>,
    pub is_anonymous: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            loading: false,
            owner_label: None,
            last_error: None,
            is_anonymous: true,
        }
    }
}

/// Holds the owner identity every remote call is scoped by.
///
/// Shared by reference between the sync client and whatever drives sign-in.
/// Operations are serialized, so concurrent first use issues exactly one
/// anonymous identity.
pub struct IdentitySession {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionPersistence>,
    current: Mutex<Option<Identity>>,
    state: watch::Sender<SessionState>,
}

impl IdentitySession {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn SessionPersistence>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            provider,
            store,
            current: Mutex::new(None),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The identity in memory, without restoring or issuing one.
    pub async fn peek(&self) -> Option<Identity> {
        self.current.lock().await.clone()
    }

    /// Return the active identity, establishing an anonymous one if needed.
    ///
    /// A persisted identity is restored first; an expired one is refreshed
    /// silently.
    pub async fn current_identity(&self) -> AuthResult<Identity> {
        let mut current = self.current.lock().await;
        self.restore(&mut current);

        if let Some(identity) = current.as_ref() {
            if !identity.needs_refresh() {
                return Ok(identity.clone());
            }
            self.begin();
            let result = self.refresh(identity).await;
            return self.finish(&mut current, result);
        }

        self.begin();
        let result = self.provider.sign_in_anonymously().await;
        if let Ok(identity) = &result {
            tracing::info!(owner = %identity.owner, "Issued anonymous identity");
        }
        self.finish(&mut current, result)
    }

    /// Exchange a credential for its permanent identity.
    ///
    /// This replaces the owner key. Documents stored under the previous key
    /// stay where they are.
    pub async fn sign_in(&self, credential: &Credential) -> AuthResult<Identity> {
        let mut current = self.current.lock().await;
        self.restore(&mut current);
        let previous = current.as_ref().map(|identity| identity.owner.clone());

        self.begin();
        let result = self.provider.sign_in(credential).await;
        if let (Ok(identity), Some(previous)) = (&result, previous) {
            if identity.owner != previous {
                tracing::info!(
                    previous = %previous,
                    owner = %identity.owner,
                    "Signed in; documents under the previous owner key are no longer synced"
                );
            }
        }
        self.finish(&mut current, result)
    }

    /// Link a credential to the current identity, keeping its owner key.
    ///
    /// An already permanent identity is returned unchanged.
    pub async fn upgrade_to_permanent(&self, credential: &Credential) -> AuthResult<Identity> {
        let mut current = self.current.lock().await;
        self.restore(&mut current);

        let Some(existing) = current.clone() else {
            return self.fail(AuthError::NoSession);
        };
        if !existing.is_anonymous() {
            return Ok(existing);
        }

        self.begin();
        let result = match self.provider.link_credential(&existing, credential).await {
            Ok(linked) if linked.owner != existing.owner => {
                tracing::warn!(
                    owner = %existing.owner,
                    returned = %linked.owner,
                    "Upgrade returned a different owner key"
                );
                Err(AuthError::KeyChanged)
            }
            Ok(linked) => {
                tracing::info!(owner = %linked.owner, "Upgraded identity to permanent");
                Ok(linked)
            }
            Err(AuthError::AlreadyPermanent) => Ok(existing),
            Err(error) => Err(error),
        };
        self.finish(&mut current, result)
    }

    /// Discard the current identity and immediately issue a new anonymous one.
    pub async fn sign_out(&self) -> AuthResult<Identity> {
        let mut current = self.current.lock().await;
        self.restore(&mut current);

        self.begin();
        if let Some(previous) = current.take() {
            if let Err(error) = self.provider.sign_out(&previous).await {
                tracing::warn!("Provider sign-out failed: {error}");
            }
        }
        if let Err(error) = self.store.clear_session() {
            tracing::warn!("Failed to clear persisted session: {error}");
        }

        let result = self.provider.sign_in_anonymously().await;
        if let Ok(identity) = &result {
            tracing::info!(owner = %identity.owner, "Signed out; issued new anonymous identity");
        }
        self.finish(&mut current, result)
    }

    async fn refresh(&self, identity: &Identity) -> AuthResult<Identity> {
        let refreshed = self.provider.refresh(identity).await?;
        if refreshed.owner != identity.owner {
            return Err(AuthError::KeyChanged);
        }
        tracing::debug!(owner = %refreshed.owner, "Refreshed identity tokens");
        Ok(refreshed)
    }

    fn restore(&self, current: &mut Option<Identity>) {
        if current.is_some() {
            return;
        }
        match self.store.load_session() {
            Ok(Some(identity)) => {
                tracing::debug!(owner = %identity.owner, "Restored persisted identity");
                self.publish(&identity);
                *current = Some(identity);
            }
            Ok(None) => {}
            Err(error) => tracing::warn!("Ignoring unreadable persisted session: {error}"),
        }
    }

    fn begin(&self) {
        self.state.send_modify(|state| state.loading = true);
    }

    /// Install a successful result and persist it, or record the failure.
    fn finish(
        &self,
        current: &mut Option<Identity>,
        result: AuthResult<Identity>,
    ) -> AuthResult<Identity> {
        match result {
            Ok(identity) => {
                if let Err(error) = self.store.save_session(&identity) {
                    tracing::warn!("Failed to persist session: {error}");
                }
                self.publish(&identity);
                *current = Some(identity.clone());
                Ok(identity)
            }
            Err(error) => self.fail(error),
        }
    }

    fn fail(&self, error: AuthError) -> AuthResult<Identity> {
        self.state.send_modify(|state| {
            state.loading = false;
            state.last_error = Some(error.to_string());
        });
        Err(error)
    }

    fn publish(&self, identity: &Identity) {
        self.state.send_replace(SessionState {
            loading: false,
            owner_label: identity.email.clone(),
            last_error: None,
            is_anonymous: identity.is_anonymous(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityKind, LocalIdentityProvider, MemorySessionStore, OwnerKey};
    use async_trait::async_trait;

    fn credential() -> Credential {
        Credential::new("reader@example.com", "secret").unwrap()
    }

    fn session_with(
        provider: Arc<dyn IdentityProvider>,
    ) -> (IdentitySession, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        (IdentitySession::new(provider, store.clone()), store)
    }

    fn session() -> (IdentitySession, Arc<MemorySessionStore>) {
        session_with(Arc::new(LocalIdentityProvider::new()))
    }

    #[tokio::test]
    async fn first_use_issues_and_persists_one_anonymous_identity() {
        let (session, store) = session();
        assert_eq!(session.peek().await, None);

        let first = session.current_identity().await.unwrap();
        let second = session.current_identity().await.unwrap();

        assert!(first.is_anonymous());
        assert_eq!(first, second);
        assert_eq!(store.load_session().unwrap(), Some(first));
        assert!(session.state().is_anonymous);
    }

    #[tokio::test]
    async fn persisted_identity_is_restored_before_issuing() {
        let store = Arc::new(MemorySessionStore::new());
        let saved = Identity::anonymous(OwnerKey::new("u1"));
        store.save_session(&saved).unwrap();

        let session = IdentitySession::new(Arc::new(LocalIdentityProvider::new()), store);
        assert_eq!(session.current_identity().await.unwrap(), saved);
    }

    #[tokio::test]
    async fn upgrade_twice_keeps_owner_key() {
        let (session, _) = session();
        let anonymous = session.current_identity().await.unwrap();

        let upgraded = session.upgrade_to_permanent(&credential()).await.unwrap();
        let again = session.upgrade_to_permanent(&credential()).await.unwrap();

        assert_eq!(upgraded.owner, anonymous.owner);
        assert_eq!(again.owner, anonymous.owner);
        assert_eq!(again.kind, IdentityKind::Permanent);

        let state = session.state();
        assert!(!state.is_anonymous);
        assert_eq!(state.owner_label.as_deref(), Some("reader@example.com"));
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn upgrade_without_session_fails() {
        let (session, _) = session();
        let error = session.upgrade_to_permanent(&credential()).await.unwrap_err();

        assert!(matches!(error, AuthError::NoSession));
        assert!(session.state().last_error.is_some());
    }

    #[tokio::test]
    async fn sign_out_issues_a_new_key() {
        let (session, store) = session();
        let before = session.current_identity().await.unwrap();

        let after = session.sign_out().await.unwrap();

        assert_ne!(before.owner, after.owner);
        assert!(after.is_anonymous());
        assert_eq!(store.load_session().unwrap(), Some(after));
    }

    #[tokio::test]
    async fn sign_in_replaces_owner_key() {
        let provider = Arc::new(LocalIdentityProvider::new());
        let registered = provider.register(&credential()).unwrap();
        let (session, _) = session_with(provider);
        let anonymous = session.current_identity().await.unwrap();

        let signed_in = session.sign_in(&credential()).await.unwrap();

        assert_eq!(signed_in.owner, registered);
        assert_ne!(signed_in.owner, anonymous.owner);
        assert_eq!(session.current_identity().await.unwrap(), signed_in);
    }

    #[tokio::test]
    async fn rejected_sign_in_keeps_session_and_records_error() {
        let (session, _) = session();
        let anonymous = session.current_identity().await.unwrap();

        let error = session.sign_in(&credential()).await.unwrap_err();

        assert!(matches!(error, AuthError::Rejected(_)));
        assert_eq!(session.peek().await, Some(anonymous));
        let state = session.state();
        assert!(!state.loading);
        assert!(state.last_error.is_some());
    }

    struct KeySwappingProvider;

    #[async_trait]
    impl IdentityProvider for KeySwappingProvider {
        async fn sign_in_anonymously(&self) -> AuthResult<Identity> {
            Ok(Identity::anonymous(OwnerKey::new("anon")))
        }

        async fn sign_in(&self, _credential: &Credential) -> AuthResult<Identity> {
            Err(AuthError::NotConfigured)
        }

        async fn link_credential(
            &self,
            _current: &Identity,
            credential: &Credential,
        ) -> AuthResult<Identity> {
            Ok(Identity {
                owner: OwnerKey::new("someone-else"),
                kind: IdentityKind::Permanent,
                email: Some(credential.email.clone()),
                tokens: None,
            })
        }

        async fn refresh(&self, current: &Identity) -> AuthResult<Identity> {
            Ok(current.clone())
        }

        async fn sign_out(&self, _current: &Identity) -> AuthResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn upgrade_that_changes_key_is_refused() {
        let (session, _) = session_with(Arc::new(KeySwappingProvider));
        let anonymous = session.current_identity().await.unwrap();

        let error = session.upgrade_to_permanent(&credential()).await.unwrap_err();

        assert!(matches!(error, AuthError::KeyChanged));
        assert_eq!(session.peek().await, Some(anonymous));
    }
}
