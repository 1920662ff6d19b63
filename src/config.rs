//! Client configuration and base-URL resolution.
//!
//! All ambient reads (config file, environment variable) happen here, at the
//! composition edge. Core logic only ever sees the resolved values — the
//! session and client never sniff the environment themselves.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backend base URL used by production builds when none is configured.
pub const PRODUCTION_URL: &str = "https://app.latchkey.dev";

/// Backend base URL used by development builds when none is configured.
pub const DEVELOPMENT_URL: &str = "http://localhost:8001";

/// Every resolved base URL is suffixed with this path segment.
const API_SUFFIX: &str = "/api";

/// Environment variable overriding the configured backend URL.
const BACKEND_URL_ENV: &str = "LATCHKEY_BACKEND_URL";

/// Deployment profile, chosen by the embedding application at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Talk to the production backend by default.
    #[default]
    Production,
    /// Talk to a local backend by default.
    Development,
}

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit backend base URL. Takes precedence over profile defaults.
    pub backend_url: Option<String>,
    /// Deployment profile selecting the fallback base URL.
    pub profile: Profile,
    /// Override for the on-disk state directory.
    pub state_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the platform config directory, then apply the
    /// `LATCHKEY_BACKEND_URL` environment override. Missing or malformed
    /// config files fall back to defaults — configuration is never fatal.
    pub fn load() -> Self {
        let mut config = Self::from_config_file().unwrap_or_default();

        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                config.backend_url = Some(url.trim().to_string());
            }
        }

        config
    }

    fn from_config_file() -> Option<Self> {
        let dirs = directories::ProjectDirs::from("dev", "latchkey", "latchkey")?;
        let path = dirs.config_dir().join("config.toml");
        let raw = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&raw) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("ignoring malformed config at {}: {err}", path.display());
                None
            }
        }
    }

    /// Resolve the API base URL: explicit value, else the profile default,
    /// always suffixed with `/api`.
    pub fn api_base(&self) -> String {
        let base = match self.backend_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url.trim(),
            _ => match self.profile {
                Profile::Production => PRODUCTION_URL,
                Profile::Development => DEVELOPMENT_URL,
            },
        };
        format!("{}{API_SUFFIX}", base.trim_end_matches('/'))
    }
}
