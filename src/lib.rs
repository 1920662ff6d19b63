//! Latchkey — device-identity session client.
//!
//! Authenticates a client to a backend API without a user-entered credential:
//! a reproducible fingerprint is derived from device signals, exchanged for a
//! bearer token at the backend's auto-connect endpoint, and attached to every
//! outgoing request. Token loss or expiry is healed in the background by a
//! single-flight re-authentication pass.
//!
//! ## Design
//! - Signal acquisition is a list of small capability probes; an unavailable
//!   source degrades to a fixed sentinel instead of failing the fingerprint.
//! - The token and the cached device descriptor live in plain files under the
//!   state directory. Persistence is best-effort; the in-memory value is
//!   authoritative for the running session.
//! - A 401 anywhere clears the token and (for non-auth endpoints) spawns one
//!   background reconnect. The failing call still fails — recovery is for
//!   future calls. The auto-connect endpoint itself never re-enters recovery.

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod fingerprint;
pub mod session;
pub mod storage;

pub use client::ApiClient;
pub use config::{Config, Profile};
pub use device::DeviceInfo;
pub use error::ApiError;
pub use fingerprint::{DeviceFingerprint, Fingerprinter};
pub use session::{Phase, Session, UserProfile};
pub use storage::{DeviceStore, StateDir, TokenStore};
