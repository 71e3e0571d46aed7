use std::io;

use shelf_core::auth::AuthError;
use shelf_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] shelf_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Search(String),
    #[error("Book title cannot be empty")]
    EmptyTitle,
    #[error("Book ID cannot be empty")]
    EmptyBookId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Book not found: {0}")]
    BookNotFound(String),
    #[error("No result number {0}; the search returned {1}")]
    InvalidSelection(usize, usize),
    #[error("Restore failed; the cloud copy could not be read")]
    RestoreFailed,
    #[error("Invalid logging directive: {0}")]
    Logging(String),
    #[error(
        "Accounts are not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY to sign in or upgrade."
    )]
    AuthNotConfigured,
}
