//! Durable local state: the bearer token and the cached device descriptor.
//!
//! Two plain files under the state directory, no expiry metadata. Disk I/O
//! is best-effort: a failed write or a malformed file is logged and treated
//! as a cache miss, never propagated. The in-memory value stays
//! authoritative for the running session.

use crate::device::DeviceInfo;
use anyhow::Context;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// File holding the raw bearer token.
const TOKEN_FILE: &str = "session.token";

/// File holding the serialized device descriptor.
const DEVICE_FILE: &str = "device.json";

/// Resolved on-disk state directory.
#[derive(Debug, Clone)]
pub struct StateDir(PathBuf);

impl StateDir {
    /// Resolve the state directory: explicit override, else the platform
    /// data dir. Creates the directory if missing.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let dir = match explicit {
            Some(path) => path.to_path_buf(),
            None => directories::ProjectDirs::from("dev", "latchkey", "latchkey")
                .context("no home directory available for state storage")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating state dir {}", dir.display()))?;
        Ok(Self(dir))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    fn file(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

/// Holder of the current bearer token. At most one token at a time;
/// presence of a token is the sole local indicator of "authenticated".
pub struct TokenStore {
    path: PathBuf,
    current: Mutex<Option<String>>,
}

impl TokenStore {
    /// Open the store, loading any token persisted by a prior session.
    pub fn open(dir: &StateDir) -> Self {
        let path = dir.file(TOKEN_FILE);
        let current = std::fs::read_to_string(&path)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|token| !token.is_empty());
        Self {
            path,
            current: Mutex::new(current),
        }
    }

    /// Store a token. An empty token is equivalent to [`TokenStore::clear`].
    pub fn set(&self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            self.clear();
            return;
        }
        *self.current.lock() = Some(token.to_string());
        if let Err(err) = std::fs::write(&self.path, token) {
            tracing::warn!("failed to persist token to {}: {err}", self.path.display());
        }
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Drop the token from memory and disk.
    pub fn clear(&self) {
        *self.current.lock() = None;
        if self.path.exists() {
            if let Err(err) = std::fs::remove_file(&self.path) {
                tracing::warn!("failed to remove token file {}: {err}", self.path.display());
            }
        }
    }
}

/// Best-effort cache of the last assembled device descriptor.
pub struct DeviceStore {
    path: PathBuf,
}

impl DeviceStore {
    pub fn open(dir: &StateDir) -> Self {
        Self {
            path: dir.file(DEVICE_FILE),
        }
    }

    /// Overwrite the cached descriptor. Failures are logged, not propagated.
    pub fn persist(&self, info: &DeviceInfo) {
        let payload = match serde_json::to_vec_pretty(info) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("failed to serialize device descriptor: {err}");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, payload) {
            tracing::warn!(
                "failed to persist device descriptor to {}: {err}",
                self.path.display()
            );
        }
    }

    /// Load the cached descriptor. Missing file and malformed content both
    /// read as absent.
    pub fn load(&self) -> Option<DeviceInfo> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::warn!(
                    "ignoring malformed device cache at {}: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Forget the cached descriptor.
    pub fn clear(&self) {
        if self.path.exists() {
            if let Err(err) = std::fs::remove_file(&self.path) {
                tracing::warn!(
                    "failed to remove device cache {}: {err}",
                    self.path.display()
                );
            }
        }
    }
}
