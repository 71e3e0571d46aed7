//! Owner identity: who the remote documents belong to.
//!
//! An [`IdentitySession`] holds the active [`Identity`] and talks to an
//! [`IdentityProvider`] to issue, upgrade, refresh and discard it. The
//! identity is anonymous by default; upgrading links a credential while
//! keeping the owner key, signing in swaps in a different key.

mod local;
mod persistence;
mod session;
mod supabase;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalIdentityProvider;
pub use persistence::{FileSessionStore, MemorySessionStore, SessionPersistence};
pub use session::{IdentitySession, SessionState};
pub use supabase::{normalize_auth_url, resolve_optional_supabase_config, SupabaseIdentityProvider};

use crate::util::unix_timestamp_now;

const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Opaque key scoping an owner's remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Anonymous,
    Permanent,
}

/// Bearer tokens issued by a remote identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl IdentityTokens {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for IdentityTokens {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("IdentityTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The active owner identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub owner: OwnerKey,
    pub kind: IdentityKind,
    pub email: Option<String>,
    /// Absent for providers that do not issue bearer tokens
    #[serde(default)]
    pub tokens: Option<IdentityTokens>,
}

impl Identity {
    pub fn anonymous(owner: OwnerKey) -> Self {
        Self {
            owner,
            kind: IdentityKind::Anonymous,
            email: None,
            tokens: None,
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.kind == IdentityKind::Anonymous
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|tokens| tokens.access_token.as_str())
    }

    /// Whether the bearer token must be re-issued before use.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.tokens.as_ref().is_some_and(IdentityTokens::is_expired)
    }
}

/// Email/password credential used to sign in or upgrade.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl Credential {
    pub fn new(email: &str, password: &str) -> AuthResult<Self> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::Rejected("Email is required".to_string()));
        }
        if password.trim().is_empty() {
            return Err(AuthError::Rejected("Password is required".to_string()));
        }
        Ok(Self {
            email: email.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No identity session exists.")]
    NoSession,
    #[error("Identity is already permanent.")]
    AlreadyPermanent,
    #[error("Credential rejected: {0}")]
    Rejected(String),
    #[error("Identity provider changed the owner key of an existing identity.")]
    KeyChanged,
    #[error("Identity provider is not configured for this build.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Session storage error: {0}")]
    SessionStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Issues and manages owner identities.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Issue a fresh anonymous identity.
    async fn sign_in_anonymously(&self) -> AuthResult<Identity>;

    /// Exchange a credential for its permanent identity.
    async fn sign_in(&self, credential: &Credential) -> AuthResult<Identity>;

    /// Attach a credential to `current`, keeping its owner key.
    async fn link_credential(
        &self,
        current: &Identity,
        credential: &Credential,
    ) -> AuthResult<Identity>;

    /// Silently re-issue tokens for `current`.
    async fn refresh(&self, current: &Identity) -> AuthResult<Identity>;

    /// Invalidate `current` on the provider side.
    async fn sign_out(&self, current: &Identity) -> AuthResult<()>;
}
