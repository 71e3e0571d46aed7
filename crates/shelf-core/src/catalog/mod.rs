//! Remote catalog lookup.
//!
//! A stateless keyword search returning candidate books. The default
//! implementation talks to the Open Library search API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Book, BookId};

pub const DEFAULT_CATALOG_URL: &str = "https://openlibrary.org";
const SEARCH_FIELDS: &str = "key,title,author_name,first_publish_year,cover_i";
const SEARCH_LIMIT: &str = "20";

#[derive(Debug, Error)]
pub enum SearchError {
    /// The catalog host could not be reached at all
    #[error("catalog unreachable")]
    Offline,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Transport(String),
}

impl SearchError {
    /// Short message suitable for showing to the person searching.
    pub fn user_message(&self) -> String {
        match self {
            Self::Offline => "No internet connection.".to_string(),
            other => format!("Search failed: {other}"),
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            Self::Offline
        } else if error.is_decode() {
            Self::Malformed(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Book>, SearchError>;
}

#[derive(Clone)]
pub struct OpenLibraryCatalog {
    base_url: String,
    client: Client,
}

impl OpenLibraryCatalog {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, SearchError> {
        Ok(Self {
            base_url: base_url.as_ref().trim().trim_end_matches('/').to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl CatalogLookup for OpenLibraryCatalog {
    async fn search(&self, query: &str) -> Result<Vec<Book>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("q", query),
                ("fields", SEARCH_FIELDS),
                ("limit", SEARCH_LIMIT),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let payload: SearchResponse =
            serde_json::from_str(&body).map_err(|error| SearchError::Malformed(error.to_string()))?;
        tracing::debug!(query, hits = payload.docs.len(), "Catalog search finished");
        Ok(payload.docs.into_iter().map(SearchDoc::into_book).collect())
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    key: Option<String>,
    title: Option<String>,
    author_name: Option<Vec<String>>,
    first_publish_year: Option<i64>,
    cover_i: Option<i64>,
}

impl SearchDoc {
    fn into_book(self) -> Book {
        let first_author = self
            .author_name
            .and_then(|authors| authors.into_iter().next());
        let year = self.first_publish_year.map(|year| year.to_string());

        let id = self.key.filter(|key| !key.trim().is_empty()).map_or_else(
            || {
                BookId::manual(
                    self.title.as_deref().unwrap_or_default(),
                    first_author.as_deref().unwrap_or_default(),
                    year.as_deref().unwrap_or_default(),
                )
            },
            BookId::new,
        );

        let book = Book::new(
            id,
            self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            first_author.unwrap_or_else(|| "Unknown Author".to_string()),
            year.unwrap_or_else(|| "-".to_string()),
        );
        match self.cover_i {
            Some(cover) => book.with_cover(cover),
            None => book,
        }
    }
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedup_by_id(books: Vec<Book>) -> Vec<Book> {
    let mut seen = std::collections::HashSet::new();
    books
        .into_iter()
        .filter(|book| seen.insert(book.id.clone()))
        .collect()
}
