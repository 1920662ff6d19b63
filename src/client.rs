//! Authenticated HTTP client.
//!
//! Thin request façade over reqwest: resolves paths against the configured
//! API base, attaches the bearer token when the store holds one, and maps
//! every response into the error taxonomy. Injection is unconditional — it
//! happens before any request leaves the client, never per call site.
//!
//! A 401 clears the token store here; deciding whether to re-authenticate is
//! the session's job, so this layer can be used for the auth endpoints
//! themselves without looping.

use crate::error::ApiError;
use crate::storage::TokenStore;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Auto-connect endpoint, relative to the API base.
pub const AUTO_CONNECT_PATH: &str = "/auth/auto-connect";

/// Identity probe endpoint, relative to the API base.
pub const ME_PATH: &str = "/auth/me";

/// Transport timeout per request.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Error bodies are truncated to this many characters for reporting.
const BODY_SNIPPET_LEN: usize = 256;

/// True for endpoints that are themselves part of the authentication flow.
/// Unauthorized responses from these must not trigger another auto-connect.
pub fn is_auth_path(path: &str) -> bool {
    path == AUTO_CONNECT_PATH || path == ME_PATH
}

/// Request façade bound to one API base and one token store.
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    /// Build a client against an already-resolved API base (the `/api`-suffixed
    /// URL produced by [`crate::config::Config::api_base`]).
    pub fn new(api_base: impl Into<String>, tokens: Arc<TokenStore>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// The token store this client injects from.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// `GET {base}{path}`.
    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.execute(Method::GET, path, None::<&()>).await
    }

    /// `POST {base}{path}` with a JSON body.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = self.tokens.get() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.clear();
            tracing::warn!(%method, %url, status = status.as_u16(), "unauthorized; token invalidated");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(BODY_SNIPPET_LEN)
                .collect();
            tracing::debug!(%method, %url, status = status.as_u16(), "request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(%method, %url, status = status.as_u16(), "request ok");
        Ok(response)
    }
}
