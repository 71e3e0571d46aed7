//! REST client for a hosted document store.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use super::{RemoteBook, RemoteDocumentStore, RemoteError, RemoteResult, StoredDocument};
use crate::auth::Identity;
use crate::util::{compact_text, is_http_url};

/// Document store reached over HTTP.
///
/// `users/{owner}/books/{key}` maps onto `{base}/users/{owner}/books/{key}`
/// with `PUT`, `GET` and `DELETE`. Listing `GET`s the collection, which
/// answers with a JSON object from key to document (`null` when empty).
#[derive(Clone)]
pub struct HttpDocumentStore {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> RemoteResult<Self> {
        let base_url = base_url.as_ref().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RemoteError::InvalidConfiguration(
                "Remote store URL must not be empty",
            ));
        }
        if !is_http_url(&base_url) {
            return Err(RemoteError::InvalidConfiguration(
                "Remote store URL must include http:// or https://",
            ));
        }

        Ok(Self {
            base_url,
            api_key: None,
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Send `apikey` on every request, as Supabase-hosted functions expect.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn collection_url(&self, identity: &Identity) -> String {
        format!(
            "{}/users/{}/books",
            self.base_url,
            urlencoding::encode(identity.owner.as_str())
        )
    }

    fn document_url(&self, identity: &Identity, key: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(identity),
            urlencoding::encode(key)
        )
    }

    fn authorize(&self, request: RequestBuilder, identity: &Identity) -> RequestBuilder {
        let request = match &self.api_key {
            Some(api_key) => request.header("apikey", api_key),
            None => request,
        };
        let request = request.header("Accept", "application/json");
        match identity.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn api_error(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = compact_text(&body);
    if body.is_empty() {
        RemoteError::Api(format!("HTTP {}", status.as_u16()))
    } else {
        RemoteError::Api(format!("{body} ({})", status.as_u16()))
    }
}

#[async_trait]
impl RemoteDocumentStore for HttpDocumentStore {
    async fn set(
        &self,
        identity: &Identity,
        key: &str,
        document: &RemoteBook,
    ) -> RemoteResult<()> {
        let outgoing = RemoteBook {
            updated_at: None,
            ..document.clone()
        };
        let request = self.authorize(
            self.client
                .put(self.document_url(identity, key))
                .json(&outgoing),
            identity,
        );

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn get(&self, identity: &Identity, key: &str) -> RemoteResult<Option<RemoteBook>> {
        let request = self.authorize(self.client.get(self.document_url(identity, key)), identity);

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body = response.text().await?;
        Ok(serde_json::from_str::<Option<RemoteBook>>(&body)?)
    }

    async fn delete(&self, identity: &Identity, key: &str) -> RemoteResult<()> {
        let request = self.authorize(
            self.client.delete(self.document_url(identity, key)),
            identity,
        );

        let response = request.send().await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(api_error(response).await)
    }

    async fn list(&self, identity: &Identity) -> RemoteResult<Vec<StoredDocument>> {
        let request = self.authorize(self.client.get(self.collection_url(identity)), identity);

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body = response.text().await?;
        parse_collection(&body)
    }
}

/// Documents that do not decode are skipped so the rest still restore.
fn parse_collection(body: &str) -> RemoteResult<Vec<StoredDocument>> {
    let collection: Option<BTreeMap<String, serde_json::Value>> = serde_json::from_str(body)?;
    Ok(collection
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<RemoteBook>(value) {
            Ok(document) => Some(StoredDocument { key, document }),
            Err(error) => {
                tracing::warn!(%key, "Skipping unreadable remote document: {error}");
                None
            }
        })
        .collect())
}
