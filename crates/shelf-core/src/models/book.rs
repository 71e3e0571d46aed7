//! Book model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const MANUAL_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5e1f_b00c_7a1e_4c0d_9f3a_2b6e_1d4c_8a70);
const COVER_BASE_URL: &str = "https://covers.openlibrary.org/b/id";

/// Stable identifier of a book.
///
/// Catalog entries reuse the catalog key verbatim (e.g. `/works/OL1W`), which
/// may contain `/`. Use [`BookId::sanitized`] whenever the id becomes part of a
/// remote document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic identifier for a manually entered book.
    ///
    /// The same (title, author, year) triple always yields the same id, so
    /// entering a book twice updates the existing row instead of duplicating it.
    #[must_use]
    pub fn manual(title: &str, author: &str, year: &str) -> Self {
        let name = format!("{}\u{1f}{}\u{1f}{}", title.trim(), author.trim(), year.trim());
        Self(format!(
            "manual-{}",
            Uuid::new_v5(&MANUAL_ID_NAMESPACE, name.as_bytes())
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Remote-safe form of this id.
    #[must_use]
    pub fn sanitized(&self) -> String {
        sanitize_id(&self.0)
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BookId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Make an id usable as a single remote document key component.
///
/// Leading and trailing `/` are trimmed and the remaining `/` become `_`.
/// The result never contains `/`, so applying it twice is a no-op.
///
/// # Examples
///
/// ```
/// use shelf_core::models::sanitize_id;
///
/// assert_eq!(sanitize_id("/works/OL1W"), "works_OL1W");
/// assert_eq!(sanitize_id(&sanitize_id("/a//b/")), sanitize_id("/a//b/"));
/// ```
#[must_use]
pub fn sanitize_id(id: &str) -> String {
    id.trim_matches('/').replace('/', "_")
}

/// Cover image size served by the cover endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl CoverSize {
    const fn suffix(self) -> char {
        match self {
            Self::Small => 'S',
            Self::Medium => 'M',
            Self::Large => 'L',
        }
    }
}

/// A book in the user's collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Stable identifier
    pub id: BookId,
    pub title: String,
    /// May be empty
    pub author: String,
    /// Display string, may be empty
    pub year: String,
    /// Catalog cover id used to derive a cover URL
    pub cover_reference: Option<i64>,
    /// Local attachment reference (photo taken on this device)
    pub local_photo_ref: Option<String>,
    /// Creation timestamp (Unix ms), never updated
    pub created_at: i64,
    /// Local change not yet confirmed by the remote store
    pub dirty: bool,
    /// Local write counter; bumped by every write to the row
    #[serde(default)]
    pub revision: i64,
}

impl Book {
    /// Create a book with the given identity and display fields.
    pub fn new(
        id: impl Into<BookId>,
        title: impl Into<String>,
        author: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            year: year.into(),
            cover_reference: None,
            local_photo_ref: None,
            created_at: crate::util::unix_millis_now(),
            dirty: false,
            revision: 0,
        }
    }

    /// Create a manually entered book, deriving its id from its fields.
    pub fn manual(
        title: impl Into<String>,
        author: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let author = author.into();
        let year = year.into();
        let id = BookId::manual(&title, &author, &year);
        Self::new(id, title, author, year)
    }

    #[must_use]
    pub const fn with_cover(mut self, cover_reference: i64) -> Self {
        self.cover_reference = Some(cover_reference);
        self
    }

    #[must_use]
    pub fn with_photo(mut self, photo_ref: impl Into<String>) -> Self {
        self.local_photo_ref = Some(photo_ref.into());
        self
    }

    #[must_use]
    pub const fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Cover image URL, when the book has a catalog cover.
    #[must_use]
    pub fn cover_url(&self, size: CoverSize) -> Option<String> {
        self.cover_reference
            .map(|cover| format!("{COVER_BASE_URL}/{cover}-{}.jpg", size.suffix()))
    }
}
