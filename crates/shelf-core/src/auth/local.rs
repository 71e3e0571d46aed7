//! In-process identity provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    AuthError, AuthResult, Credential, Identity, IdentityKind, IdentityProvider, OwnerKey,
};

#[derive(Debug, Clone)]
struct LocalAccount {
    password: String,
    owner: OwnerKey,
}

/// Issues identities without a network round trip.
///
/// Accounts live in memory, keyed by lowercase email. Useful for tests and
/// for embedding the engine where no hosted identity service exists. The
/// offline switch makes every call fail as an unreachable provider would.
#[derive(Debug, Default)]
pub struct LocalIdentityProvider {
    accounts: Mutex<HashMap<String, LocalAccount>>,
    offline: AtomicBool,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Create a permanent account that is not linked to any anonymous identity.
    pub fn register(&self, credential: &Credential) -> AuthResult<OwnerKey> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let email = credential.email.to_lowercase();
        if accounts.contains_key(&email) {
            return Err(AuthError::Rejected("Email is already registered".to_string()));
        }
        let owner = OwnerKey::new(Uuid::now_v7().to_string());
        accounts.insert(
            email,
            LocalAccount {
                password: credential.password.clone(),
                owner: owner.clone(),
            },
        );
        Ok(owner)
    }

    fn ensure_reachable(&self) -> AuthResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(AuthError::Api("identity provider unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in_anonymously(&self) -> AuthResult<Identity> {
        self.ensure_reachable()?;
        Ok(Identity::anonymous(OwnerKey::new(
            Uuid::now_v7().to_string(),
        )))
    }

    async fn sign_in(&self, credential: &Credential) -> AuthResult<Identity> {
        self.ensure_reachable()?;
        let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let account = accounts
            .get(&credential.email.to_lowercase())
            .filter(|account| account.password == credential.password)
            .ok_or_else(|| AuthError::Rejected("Invalid email or password".to_string()))?;

        Ok(Identity {
            owner: account.owner.clone(),
            kind: IdentityKind::Permanent,
            email: Some(credential.email.clone()),
            tokens: None,
        })
    }

    async fn link_credential(
        &self,
        current: &Identity,
        credential: &Credential,
    ) -> AuthResult<Identity> {
        self.ensure_reachable()?;
        if !current.is_anonymous() {
            return Err(AuthError::AlreadyPermanent);
        }

        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let email = credential.email.to_lowercase();
        if accounts.contains_key(&email) {
            return Err(AuthError::Rejected(
                "Email is already linked to another account".to_string(),
            ));
        }
        accounts.insert(
            email,
            LocalAccount {
                password: credential.password.clone(),
                owner: current.owner.clone(),
            },
        );

        Ok(Identity {
            owner: current.owner.clone(),
            kind: IdentityKind::Permanent,
            email: Some(credential.email.clone()),
            tokens: None,
        })
    }

    async fn refresh(&self, current: &Identity) -> AuthResult<Identity> {
        self.ensure_reachable()?;
        Ok(current.clone())
    }

    async fn sign_out(&self, _current: &Identity) -> AuthResult<()> {
        self.ensure_reachable()
    }
}
