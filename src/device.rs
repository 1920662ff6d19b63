//! Device descriptor assembly.
//!
//! Packages the fingerprint with a human-readable label and the client
//! category tag into the payload the auto-connect endpoint expects. The wire
//! field names (`device_fingerprint`, `device_name`, `device_type`) are the
//! backend's; the persisted cache uses the same shape.

use crate::fingerprint::{DeviceFingerprint, Fingerprinter};
use serde::{Deserialize, Serialize};

/// Client category tag sent as `device_type`.
pub const DEVICE_CLASS: &str = "desktop";

/// Label used when no browser marker matches the user-agent. Matches the
/// backend's own default for the `device_name` field.
const DEFAULT_LABEL: &str = "Web Browser";

/// Ordered browser markers; first substring match wins. Chrome precedes
/// Safari because Chrome user-agents contain both.
const BROWSER_MARKERS: [&str; 5] = ["Chrome", "Firefox", "Safari", "Edge", "Opera"];

/// Device descriptor submitted to auto-connect and cached on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "device_fingerprint")]
    pub fingerprint: DeviceFingerprint,
    #[serde(rename = "device_name")]
    pub display_name: String,
    #[serde(rename = "device_type")]
    pub device_class: String,
}

impl DeviceInfo {
    /// Build a fresh descriptor from the generator's current signals.
    pub fn assemble(fingerprinter: &Fingerprinter) -> Self {
        let user_agent = fingerprinter.read_signal("user_agent").unwrap_or_default();
        Self {
            fingerprint: fingerprinter.generate(),
            display_name: display_name_for(&user_agent),
            device_class: DEVICE_CLASS.to_string(),
        }
    }
}

/// Derive the display label by scanning the user-agent for known browser
/// markers, in fixed order.
pub fn display_name_for(user_agent: &str) -> String {
    for marker in BROWSER_MARKERS {
        if user_agent.contains(marker) {
            return format!("{marker} Browser");
        }
    }
    DEFAULT_LABEL.to_string()
}
