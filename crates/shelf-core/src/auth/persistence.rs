//! Where the active identity survives process restarts.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{AuthError, AuthResult, Identity};

pub trait SessionPersistence: Send + Sync {
    fn load_session(&self) -> AuthResult<Option<Identity>>;
    fn save_session(&self, identity: &Identity) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Keeps the identity for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Identity>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<Identity>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_session(&self, identity: &Identity) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Stores the identity as JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn storage_error(error: &std::io::Error) -> AuthError {
    AuthError::SessionStorage(error.to_string())
}

impl SessionPersistence for FileSessionStore {
    fn load_session(&self) -> AuthResult<Option<Identity>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(storage_error(&error)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save_session(&self, identity: &Identity) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| storage_error(&error))?;
        }
        let payload = serde_json::to_string_pretty(identity)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, payload).map_err(|error| storage_error(&error))?;
        std::fs::rename(&staging, &self.path).map_err(|error| storage_error(&error))?;
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(storage_error(&error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityKind, IdentityTokens, OwnerKey};

    fn identity() -> Identity {
        Identity {
            owner: OwnerKey::new("owner-1"),
            kind: IdentityKind::Permanent,
            email: Some("reader@example.com".to_string()),
            tokens: Some(IdentityTokens {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: 1_700_000_000,
            }),
        }
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path().join("shelf").join("session.json"));

        assert_eq!(store.load_session().unwrap(), None);

        store.save_session(&identity()).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(identity()));

        store.clear_session().unwrap();
        store.clear_session().unwrap();
        assert_eq!(store.load_session().unwrap(), None);
    }

    #[test]
    fn file_store_reports_corrupt_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let error = FileSessionStore::new(&path).load_session().unwrap_err();
        assert!(matches!(error, AuthError::Json(_)));
    }

    #[test]
    fn memory_store_replaces_previous_session() {
        let store = MemorySessionStore::new();
        store
            .save_session(&Identity::anonymous(OwnerKey::new("first")))
            .unwrap();
        store.save_session(&identity()).unwrap();

        assert_eq!(store.load_session().unwrap(), Some(identity()));
    }
}
