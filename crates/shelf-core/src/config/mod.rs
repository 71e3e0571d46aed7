//! Engine configuration resolved from environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::{
    resolve_optional_supabase_config, FileSessionStore, IdentityProvider, IdentitySession,
    LocalIdentityProvider, SupabaseIdentityProvider,
};
use crate::catalog::{OpenLibraryCatalog, DEFAULT_CATALOG_URL};
use crate::remote::{HttpDocumentStore, RemoteDocumentStore, UnconfiguredDocumentStore};
use crate::services::LocalStore;
use crate::sync::{SyncCoordinator, DEFAULT_SYNC_INTERVAL};
use crate::util::is_http_url;

const APP_DIR: &str = "shelf";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No data directory available; set {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseSettings {
    pub url: String,
    pub anon_key: String,
}

impl fmt::Debug for SupabaseSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseSettings")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub remote_url: Option<String>,
    pub supabase: Option<SupabaseSettings>,
    pub catalog_url: String,
    pub sync_interval: Duration,
    pub http_timeout: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = match optional_trimmed(&lookup, "SHELF_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_data_file("shelf.db").ok_or(ConfigError::MissingVar("SHELF_DB_PATH"))?,
        };
        let session_path = match optional_trimmed(&lookup, "SHELF_SESSION_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_data_file("session.json")
                .ok_or(ConfigError::MissingVar("SHELF_SESSION_PATH"))?,
        };

        let remote_url = optional_trimmed(&lookup, "SHELF_REMOTE_URL")
            .map(|url| http_url("SHELF_REMOTE_URL", &url))
            .transpose()?;
        let catalog_url = http_url(
            "SHELF_CATALOG_URL",
            &value_or_default(&lookup, "SHELF_CATALOG_URL", DEFAULT_CATALOG_URL),
        )?;

        let supabase = resolve_optional_supabase_config(
            optional_trimmed(&lookup, "SUPABASE_URL"),
            optional_trimmed(&lookup, "SUPABASE_ANON_KEY"),
        )
        .map_err(|_| {
            ConfigError::Invalid(
                "SUPABASE_URL and SUPABASE_ANON_KEY must be set together".to_string(),
            )
        })?
        .map(|(url, anon_key)| {
            http_url("SUPABASE_URL", &url).map(|url| SupabaseSettings { url, anon_key })
        })
        .transpose()?;

        let sync_interval = seconds(&lookup, "SHELF_SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL)?;
        let http_timeout = seconds(&lookup, "SHELF_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT)?;

        Ok(Self {
            db_path,
            session_path,
            remote_url,
            supabase,
            catalog_url,
            sync_interval,
            http_timeout,
        })
    }

    /// Identity provider for this configuration.
    ///
    /// Without Supabase settings identities are issued locally and only the
    /// persisted session keeps them stable across runs.
    pub fn identity_provider(&self) -> Result<Arc<dyn IdentityProvider>, ConfigError> {
        match &self.supabase {
            Some(settings) => {
                let provider =
                    SupabaseIdentityProvider::new(&settings.url, &settings.anon_key, self.http_timeout)
                        .map_err(|error| ConfigError::Invalid(error.to_string()))?;
                Ok(Arc::new(provider))
            }
            None => Ok(Arc::new(LocalIdentityProvider::new())),
        }
    }

    pub fn remote_store(&self) -> Result<Arc<dyn RemoteDocumentStore>, ConfigError> {
        let Some(url) = &self.remote_url else {
            tracing::warn!("SHELF_REMOTE_URL is not set; changes stay local");
            return Ok(Arc::new(UnconfiguredDocumentStore));
        };
        let store = HttpDocumentStore::new(url, self.http_timeout)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;
        Ok(match &self.supabase {
            Some(settings) => Arc::new(store.with_api_key(&settings.anon_key)),
            None => Arc::new(store),
        })
    }

    /// Open the local store and wire every collaborator into a coordinator.
    pub fn build_coordinator(&self) -> Result<SyncCoordinator, ConfigError> {
        let local = LocalStore::open_path(&self.db_path)?;
        let session = Arc::new(IdentitySession::new(
            self.identity_provider()?,
            Arc::new(FileSessionStore::new(&self.session_path)),
        ));
        let catalog = OpenLibraryCatalog::new(&self.catalog_url, self.http_timeout)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        Ok(SyncCoordinator::new(
            local,
            session,
            self.remote_store()?,
            Arc::new(catalog),
        ))
    }
}

fn default_data_file(name: &str) -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR).join(name))
}

fn http_url(name: &str, value: &str) -> Result<String, ConfigError> {
    if !is_http_url(value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must start with http:// or https://"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn seconds(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid(format!(
            "{name} must be a positive number of seconds"
        ))),
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
