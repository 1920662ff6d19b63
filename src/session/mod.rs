//! Session bootstrap and self-healing re-authentication.
//!
//! The session owns the injectable state the rest of the crate works
//! against: token store, device cache, bootstrap phase, and the re-auth
//! lock. It is the composition root's handle — cheap to clone, safe to
//! share across tasks.
//!
//! ## Flow
//!
//! 1. `bootstrap()`: existing token → identity probe; probe failure (or no
//!    token) → assemble device descriptor → `POST /auth/auto-connect` →
//!    store the returned token.
//! 2. Normal traffic goes through `get`/`post_json`. A 401 on a non-auth
//!    endpoint clears the token (client layer) and spawns one background
//!    reconnect here; the failing call still fails.
//! 3. Reconnection is single-flight: concurrent 401s queue on one lock, and
//!    late arrivals find the token already refreshed and return without a
//!    second backend round trip.

use crate::client::{is_auth_path, ApiClient, AUTO_CONNECT_PATH, ME_PATH};
use crate::config::Config;
use crate::device::DeviceInfo;
use crate::error::ApiError;
use crate::fingerprint::Fingerprinter;
use crate::storage::{DeviceStore, StateDir, TokenStore};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Observable bootstrap phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No token, no attempt made yet.
    Unauthenticated,
    /// Probing an existing token against the identity endpoint.
    Validating,
    /// Exchanging a fresh device descriptor for a token.
    Reconnecting,
    /// A token is held and was accepted by the backend.
    Authenticated,
    /// Auto-connect failed; the session holds no usable token.
    Failed,
}

impl Phase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Phase::Authenticated)
    }
}

/// Profile returned by the identity probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub subscription_valid_until: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Auto-connect response. Only `access_token` matters to the client;
/// everything else the backend sends rides along unread.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

struct SessionState {
    tokens: Arc<TokenStore>,
    devices: DeviceStore,
    phase: parking_lot::Mutex<Phase>,
    reauth: tokio::sync::Mutex<()>,
}

/// Device-identity session: bootstrapper, request façade, and recovery
/// coordinator in one shareable handle.
#[derive(Clone)]
pub struct Session {
    client: Arc<ApiClient>,
    fingerprinter: Arc<Fingerprinter>,
    state: Arc<SessionState>,
}

impl Session {
    /// Compose a session from configuration: state directory, stores,
    /// client, and the host fingerprint generator.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let state_dir = StateDir::resolve(config.state_dir.as_deref())?;
        let tokens = Arc::new(TokenStore::open(&state_dir));
        let devices = DeviceStore::open(&state_dir);
        let client = Arc::new(ApiClient::new(config.api_base(), tokens.clone())?);

        Ok(Self {
            client,
            fingerprinter: Arc::new(Fingerprinter::host()),
            state: Arc::new(SessionState {
                tokens,
                devices,
                phase: parking_lot::Mutex::new(Phase::Unauthenticated),
                reauth: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Replace the fingerprint generator — embeddings with richer signal
    /// access (webview shells) supply their own probe set here.
    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = Arc::new(fingerprinter);
        self
    }

    /// Current bootstrap phase.
    pub fn phase(&self) -> Phase {
        *self.state.phase.lock()
    }

    fn set_phase(&self, phase: Phase) {
        *self.state.phase.lock() = phase;
    }

    /// True while the store holds a token the backend has not rejected.
    pub fn is_authenticated(&self) -> bool {
        self.state.tokens.get().is_some()
    }

    /// Device descriptor cached by the last auto-connect, if any.
    pub fn cached_device(&self) -> Option<DeviceInfo> {
        self.state.devices.load()
    }

    /// Establish a ready session: validate any existing token, else
    /// auto-connect. Returns whether the session is ready; a `false` means
    /// the terminal phase is [`Phase::Failed`] and callers should not rely
    /// on authenticated access.
    pub async fn bootstrap(&self) -> bool {
        if self.state.tokens.get().is_some() {
            self.set_phase(Phase::Validating);
            match self.client.get(ME_PATH).await {
                Ok(_) => {
                    tracing::debug!("existing token validated");
                    self.set_phase(Phase::Authenticated);
                    return true;
                }
                Err(err) => {
                    tracing::warn!("identity probe failed: {err}; reconnecting");
                    self.state.tokens.clear();
                }
            }
        }

        self.set_phase(Phase::Reconnecting);
        let ready = self.auto_connect().await;
        self.set_phase(if ready { Phase::Authenticated } else { Phase::Failed });
        if !ready {
            tracing::error!("bootstrap failed; session not ready");
        }
        ready
    }

    /// One auto-connect attempt: assemble and cache the device descriptor,
    /// submit it, store the returned token. Every failure mode reports
    /// `false` instead of propagating — callers decide what "not ready"
    /// means for them.
    async fn auto_connect(&self) -> bool {
        let info = DeviceInfo::assemble(&self.fingerprinter);
        self.state.devices.persist(&info);

        let response = match self.client.post_json(AUTO_CONNECT_PATH, &info).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("auto-connect request failed: {err}");
                return false;
            }
        };
        let body: TokenResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                tracing::error!("auto-connect response unreadable: {err}");
                return false;
            }
        };

        match body.access_token.filter(|token| !token.is_empty()) {
            Some(token) => {
                self.state.tokens.set(&token);
                tracing::debug!(device = %info.display_name, "session established");
                true
            }
            None => {
                tracing::error!("auto-connect response missing access_token");
                false
            }
        }
    }

    /// Single-flight re-authentication. Concurrent callers serialize on one
    /// lock; whoever arrives after a completed refresh sees the token and
    /// skips the backend round trip.
    pub async fn reconnect(&self) -> bool {
        let _guard = self.state.reauth.lock().await;
        if self.state.tokens.get().is_some() {
            return true;
        }

        self.set_phase(Phase::Reconnecting);
        let ready = self.auto_connect().await;
        self.set_phase(if ready { Phase::Authenticated } else { Phase::Failed });
        ready
    }

    fn spawn_reconnect(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            session.reconnect().await;
        });
    }

    /// Authenticated `GET`. On a 401 the token is already invalidated and a
    /// background reconnect is spawned; the error is still returned — the
    /// recovery is for future calls, not this one.
    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        let result = self.client.get(path).await;
        self.observe(path, &result);
        result
    }

    /// Authenticated `POST` with a JSON body. Same recovery behavior as
    /// [`Session::get`].
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let result = self.client.post_json(path, body).await;
        self.observe(path, &result);
        result
    }

    fn observe<T>(&self, path: &str, result: &Result<T, ApiError>) {
        if let Err(err) = result {
            if err.is_unauthorized() && !is_auth_path(path) {
                tracing::debug!("401 on {path}; spawning background re-authentication");
                self.spawn_reconnect();
            }
        }
    }

    /// Fetch the authenticated identity. Goes through the raw client: a 401
    /// here must not trigger recovery.
    pub async fn whoami(&self) -> Result<UserProfile, ApiError> {
        let response = self.client.get(ME_PATH).await?;
        response
            .json::<UserProfile>()
            .await
            .map_err(|err| ApiError::Protocol(format!("malformed identity response: {err}")))
    }

    /// Drop the token and the cached device descriptor.
    pub fn logout(&self) {
        self.state.tokens.clear();
        self.state.devices.clear();
        self.set_phase(Phase::Unauthenticated);
        tracing::debug!("session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method as http_method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_against(server: &MockServer, tmp: &TempDir) -> Session {
        let config = Config {
            backend_url: Some(server.uri()),
            profile: Profile::Development,
            state_dir: Some(tmp.path().to_path_buf()),
        };
        Session::new(&config).unwrap()
    }

    fn preset_token(tmp: &TempDir, token: &str) {
        std::fs::write(tmp.path().join("session.token"), token).unwrap();
    }

    fn token_body(token: &str) -> serde_json::Value {
        json!({
            "access_token": token,
            "token_type": "bearer",
            "user": {"id": "u1", "username": "Demo User", "email": "demo@example.com"},
        })
    }

    #[tokio::test]
    async fn cold_bootstrap_performs_exactly_one_auto_connect() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok_new")))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let session = session_against(&server, &tmp);

        assert_eq!(session.phase(), Phase::Unauthenticated);
        assert!(session.bootstrap().await);
        assert_eq!(session.phase(), Phase::Authenticated);
        assert!(session.is_authenticated());
        assert!(session.cached_device().is_some());
    }

    #[tokio::test]
    async fn valid_token_short_circuits_to_authenticated() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/auth/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "u1", "username": "Demo User"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok_new")))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        preset_token(&tmp, "tok_valid");
        let session = session_against(&server, &tmp);

        assert!(session.bootstrap().await);
        assert_eq!(session.phase(), Phase::Authenticated);
    }

    #[tokio::test]
    async fn stale_token_is_cleared_and_reconnected() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok_fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        preset_token(&tmp, "tok_stale");
        let session = session_against(&server, &tmp);

        assert!(session.bootstrap().await);
        assert_eq!(session.phase(), Phase::Authenticated);
    }

    #[tokio::test]
    async fn unauthorized_auto_connect_does_not_loop() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let session = session_against(&server, &tmp);

        assert!(!session.bootstrap().await);
        assert_eq!(session.phase(), Phase::Failed);
        assert!(!session.is_authenticated());

        // Give any erroneously spawned recovery task time to fire.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn missing_access_token_is_a_protocol_failure() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"user": {"id": "u1", "username": "Demo User"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let session = session_against(&server, &tmp);

        assert!(!session.bootstrap().await);
        assert_eq!(session.phase(), Phase::Failed);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn unreachable_backend_reports_not_ready() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            backend_url: Some("http://127.0.0.1:9".into()),
            profile: Profile::Development,
            state_dir: Some(tmp.path().to_path_buf()),
        };
        let session = Session::new(&config).unwrap();

        assert!(!session.bootstrap().await);
        assert_eq!(session.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn failed_request_spawns_background_recovery() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/scans"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok_healed")))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        preset_token(&tmp, "tok_expired");
        let session = session_against(&server, &tmp);

        let err = session.get("/scans").await.unwrap_err();
        assert!(err.is_unauthorized());

        // The caller's request failed, but the background reconnect heals
        // the session for future calls.
        for _ in 0..100 {
            if session.is_authenticated() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn concurrent_reconnects_collapse_into_one_round_trip() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("tok_shared"))
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let session = session_against(&server, &tmp);

        let (first, second) = tokio::join!(session.reconnect(), session.reconnect());
        assert!(first);
        assert!(second);
    }

    #[tokio::test]
    async fn whoami_does_not_trigger_recovery() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok_new")))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        preset_token(&tmp, "tok_stale");
        let session = session_against(&server, &tmp);

        assert!(session.whoami().await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn whoami_returns_the_profile() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "username": "Demo User",
                "email": "demo@example.com",
                "tier": "essential",
                "created_at": "2025-01-01T00:00:00Z",
            })))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        preset_token(&tmp, "tok_valid");
        let session = session_against(&server, &tmp);

        let profile = session.whoami().await.unwrap();
        assert_eq!(profile.username, "Demo User");
        assert_eq!(profile.tier.as_deref(), Some("essential"));
    }

    #[tokio::test]
    async fn logout_clears_token_and_device_cache() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/auth/auto-connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok_new")))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let session = session_against(&server, &tmp);
        assert!(session.bootstrap().await);

        session.logout();
        assert!(!session.is_authenticated());
        assert!(session.cached_device().is_none());
        assert_eq!(session.phase(), Phase::Unauthenticated);
    }
}
