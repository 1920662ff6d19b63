//! Device fingerprint derivation.
//!
//! A fingerprint is a best-effort reproducible identifier, not a
//! cryptographic one: the ordered signal values are joined with a fixed
//! delimiter and reduced through a 31-multiply rolling hash with wrapped
//! signed-32-bit semantics, then base-36 encoded. The same environment
//! always produces the same value; any signal change may change it.
//!
//! The existing device registry was populated by clients hashing with the
//! classic `h * 31 + code | 0` scheme, so the arithmetic here keeps those
//! exact overflow semantics.

pub mod probes;

use probes::{
    AudioProbe, CanvasProbe, LocaleProbe, PlatformProbe, ScreenProbe, SignalProbe, TimezoneProbe,
    UserAgentProbe, WebGlProbe,
};
use serde::{Deserialize, Serialize};

/// Fixed delimiter between signal values in the hash input.
const SIGNAL_DELIMITER: &str = "|";

/// Opaque fingerprint derived from the ordered device signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint generator over an ordered probe list.
///
/// Probe order is part of the identity: it is fixed at construction and
/// never reordered between calls.
pub struct Fingerprinter {
    probes: Vec<Box<dyn SignalProbe>>,
}

impl Fingerprinter {
    /// Build a generator from an explicit ordered probe list.
    pub fn new(probes: Vec<Box<dyn SignalProbe>>) -> Self {
        Self { probes }
    }

    /// Default probe set for the native host, in the fixed signal order:
    /// screen, timezone, locale, platform, user-agent, canvas, WebGL, audio.
    pub fn host() -> Self {
        Self::new(vec![
            Box::new(ScreenProbe),
            Box::new(TimezoneProbe),
            Box::new(LocaleProbe),
            Box::new(PlatformProbe),
            Box::new(UserAgentProbe),
            Box::new(CanvasProbe),
            Box::new(WebGlProbe),
            Box::new(AudioProbe),
        ])
    }

    /// Derive the fingerprint. Synchronous, deterministic, never fails.
    pub fn generate(&self) -> DeviceFingerprint {
        let joined = self
            .probes
            .iter()
            .map(|probe| probe.read())
            .collect::<Vec<_>>()
            .join(SIGNAL_DELIMITER);
        DeviceFingerprint(to_base36(rolling_hash(&joined)))
    }

    /// Read one signal by name, if the probe set carries it. The device
    /// assembler uses this to derive the display label from the user-agent.
    pub fn read_signal(&self, name: &str) -> Option<String> {
        self.probes
            .iter()
            .find(|probe| probe.name() == name)
            .map(|probe| probe.read())
    }
}

/// 31-multiply rolling hash with wrapping `i32` arithmetic, reduced to its
/// absolute value.
fn rolling_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for ch in input.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i32);
    }
    hash.unsigned_abs()
}

/// Lowercase base-36 encoding.
fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
