//! Supabase-backed identity provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{
    AuthError, AuthResult, Credential, Identity, IdentityKind, IdentityProvider, IdentityTokens,
    OwnerKey,
};
use crate::util::{normalize_text_option, unix_timestamp_now};

#[derive(Clone)]
pub struct SupabaseIdentityProvider {
    auth_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseIdentityProvider {
    pub fn new(
        url: impl AsRef<str>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    fn user_request(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<SupabaseAuthResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, &body));
        }
        Ok(response.json::<SupabaseAuthResponse>().await?)
    }

    async fn session_request(&self, request: RequestBuilder, action: &str) -> AuthResult<Identity> {
        self.send_auth_request(request)
            .await?
            .into_identity()?
            .ok_or_else(|| {
                AuthError::Api(format!("{action} response did not include an active session"))
            })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn sign_in_anonymously(&self) -> AuthResult<Identity> {
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&serde_json::json!({ "data": {} })),
        );
        self.session_request(request, "Anonymous sign-in").await
    }

    async fn sign_in(&self, credential: &Credential) -> AuthResult<Identity> {
        let payload = serde_json::json!({
            "email": credential.email,
            "password": credential.password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );
        self.session_request(request, "Sign-in").await
    }

    async fn link_credential(
        &self,
        current: &Identity,
        credential: &Credential,
    ) -> AuthResult<Identity> {
        if !current.is_anonymous() {
            return Err(AuthError::AlreadyPermanent);
        }
        let access_token = current.access_token().ok_or(AuthError::NoSession)?;

        let payload = serde_json::json!({
            "email": credential.email,
            "password": credential.password,
        });
        let request = self.user_request(
            self.client
                .put(format!("{}/user", self.auth_url))
                .json(&payload),
            access_token,
        );

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, &body));
        }
        let user = response.json::<SupabaseUser>().await?;

        // The user object keeps its id; only the linked email changes.
        Ok(Identity {
            owner: OwnerKey::new(user.id),
            kind: IdentityKind::Permanent,
            email: user
                .email
                .or(user.new_email)
                .or_else(|| Some(credential.email.clone())),
            tokens: current.tokens.clone(),
        })
    }

    async fn refresh(&self, current: &Identity) -> AuthResult<Identity> {
        let Some(tokens) = current.tokens.as_ref() else {
            return Ok(current.clone());
        };
        if tokens.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "refresh_token": tokens.refresh_token,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        self.session_request(request, "Refresh").await
    }

    async fn sign_out(&self, current: &Identity) -> AuthResult<()> {
        let Some(access_token) = current.access_token() else {
            return Ok(());
        };
        let request = self.user_request(
            self.client.post(format!("{}/logout", self.auth_url)),
            access_token,
        );

        let response = request.send().await?;
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, &body));
        }
        Ok(())
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

pub fn resolve_optional_supabase_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> AuthResult<Option<(String, String)>> {
    let url = normalize_text_option(url);
    let anon_key = normalize_text_option(anon_key);

    match (url, anon_key) {
        (None, None) => Ok(None),
        (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
        _ => Err(AuthError::NotConfigured),
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
    session: Option<SupabaseAuthResponseSession>,
}

impl SupabaseAuthResponse {
    fn into_identity(self) -> AuthResult<Option<Identity>> {
        let nested_session = self.session;
        let access_token = self.access_token.or_else(|| {
            nested_session
                .as_ref()
                .and_then(|session| session.access_token.clone())
        });
        let refresh_token = self.refresh_token.or_else(|| {
            nested_session
                .as_ref()
                .and_then(|session| session.refresh_token.clone())
        });
        let expires_at = self
            .expires_at
            .or_else(|| {
                nested_session
                    .as_ref()
                    .and_then(|session| session.expires_at)
            })
            .or_else(|| {
                self.expires_in
                    .or_else(|| {
                        nested_session
                            .as_ref()
                            .and_then(|session| session.expires_in)
                    })
                    .map(|expires_in| unix_timestamp_now().saturating_add(expires_in))
            });
        let user = self
            .user
            .or_else(|| nested_session.and_then(|session| session.user));

        match (access_token, refresh_token, expires_at, user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                let kind = if user.is_anonymous.unwrap_or(false) {
                    IdentityKind::Anonymous
                } else {
                    IdentityKind::Permanent
                };
                Ok(Some(Identity {
                    owner: OwnerKey::new(user.id),
                    kind,
                    email: normalize_text_option(user.email),
                    tokens: Some(IdentityTokens {
                        access_token,
                        refresh_token,
                        expires_at,
                    }),
                }))
            }
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponseSession {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    new_email: Option<String>,
    #[serde(default)]
    is_anonymous: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Credential problems are reported to the user; everything else is an API fault.
fn classify_api_error(status: StatusCode, body: &str) -> AuthError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => AuthError::Rejected(message),
        _ => AuthError::Api(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_anonymous: bool) -> SupabaseUser {
        SupabaseUser {
            id: "user-1".to_string(),
            email: None,
            new_email: None,
            is_anonymous: Some(is_anonymous),
        }
    }

    #[test]
    fn normalize_auth_url_appends_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
    }

    #[test]
    fn normalize_auth_url_keeps_existing_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co/auth/v1/").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
    }

    #[test]
    fn normalize_auth_url_rejects_missing_scheme() {
        assert!(normalize_auth_url("demo.supabase.co").is_err());
        assert!(normalize_auth_url("  ").is_err());
    }

    #[test]
    fn half_configured_supabase_is_an_error() {
        assert!(matches!(
            resolve_optional_supabase_config(Some("https://x.supabase.co".to_string()), None),
            Err(AuthError::NotConfigured)
        ));
        assert!(resolve_optional_supabase_config(None, Some(" ".to_string()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn anonymous_session_response_maps_to_anonymous_identity() {
        let response = SupabaseAuthResponse {
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
            expires_in: Some(3600),
            user: Some(user(true)),
            session: None,
        };

        let identity = response.into_identity().unwrap().unwrap();
        assert_eq!(identity.owner, OwnerKey::new("user-1"));
        assert!(identity.is_anonymous());
        assert!(!identity.needs_refresh());
    }

    #[test]
    fn nested_session_fields_are_used() {
        let response = SupabaseAuthResponse {
            access_token: None,
            refresh_token: None,
            expires_at: None,
            expires_in: None,
            user: None,
            session: Some(SupabaseAuthResponseSession {
                access_token: Some("access".to_string()),
                refresh_token: Some("refresh".to_string()),
                expires_at: Some(1_700_000_000),
                expires_in: None,
                user: Some(user(false)),
            }),
        };

        let identity = response.into_identity().unwrap().unwrap();
        assert_eq!(identity.kind, IdentityKind::Permanent);
        assert_eq!(identity.tokens.unwrap().expires_at, 1_700_000_000);
    }

    #[test]
    fn partial_session_is_an_api_error() {
        let response = SupabaseAuthResponse {
            access_token: Some("access".to_string()),
            refresh_token: None,
            expires_at: None,
            expires_in: None,
            user: Some(user(false)),
            session: None,
        };
        assert!(matches!(response.into_identity(), Err(AuthError::Api(_))));
    }

    #[test]
    fn credential_failures_are_rejections() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        let error = classify_api_error(StatusCode::BAD_REQUEST, body);
        assert!(
            matches!(error, AuthError::Rejected(message) if message == "Invalid login credentials (400)")
        );

        let error = classify_api_error(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(error, AuthError::Api(message) if message == "HTTP 500"));
    }
}
