//! Wire form of a book in the remote document store.

use serde::{Deserialize, Serialize};

use crate::models::{Book, BookId, CoverSize};
use crate::util::unix_millis_now;

/// A book as stored remotely.
///
/// Field names are camelCase. Older documents used `coverId` and `photoUri`,
/// which are still accepted when reading. `updatedAt` is assigned by the
/// store and never sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub year: String,
    #[serde(default, alias = "coverId")]
    pub cover_reference: Option<i64>,
    /// Derived from `cover_reference`; written for readers without the cover rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, alias = "photoUri")]
    pub local_photo_ref: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl RemoteBook {
    /// Build the document pushed for `book`. The dirty bit is not part of it.
    pub fn from_book(book: &Book) -> Self {
        Self {
            id: Some(book.id.to_string()),
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year.clone(),
            cover_reference: book.cover_reference,
            cover_url: book.cover_url(CoverSize::Medium),
            local_photo_ref: book.local_photo_ref.clone(),
            created_at: Some(book.created_at),
            updated_at: None,
        }
    }

    /// Convert a pulled document into a clean local book.
    ///
    /// `key` is the document key, used when the document carries no id. A
    /// missing creation time becomes the current time.
    pub fn into_book(self, key: &str) -> Book {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| key.to_string());
        Book {
            id: BookId::new(id),
            title: self.title,
            author: self.author,
            year: self.year,
            cover_reference: self.cover_reference,
            local_photo_ref: self.local_photo_ref,
            created_at: self.created_at.unwrap_or_else(unix_millis_now),
            dirty: false,
            revision: 0,
        }
    }

    /// Whether both documents describe the same book, ignoring `updatedAt`.
    pub fn same_content(&self, other: &Self) -> bool {
        Self {
            updated_at: None,
            ..self.clone()
        } == Self {
            updated_at: None,
            ..other.clone()
        }
    }
}
