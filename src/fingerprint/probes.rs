//! Signal probes for fingerprint derivation.
//!
//! Each probe reads one device signal and is infallible at the trait
//! boundary: whatever goes wrong inside, it returns a fixed sentinel string
//! so fingerprint computation never aborts. Host probes cover what a native
//! process can see; embeddings with a rendering surface (webview shells)
//! replace the canvas/WebGL/audio slots with [`FixedProbe`] values of their
//! own.

/// Sentinel for a host without a canvas rendering surface.
pub const CANVAS_UNAVAILABLE: &str = "canvas-error";

/// Sentinel for a host without a WebGL context.
pub const WEBGL_UNAVAILABLE: &str = "no-webgl";

/// Sentinel for a host without an audio processing pipeline.
pub const AUDIO_UNAVAILABLE: &str = "audio-error";

/// Sentinel for a host without a queryable display.
pub const SCREEN_UNAVAILABLE: &str = "no-screen";

/// Sentinel for a host without locale settings.
pub const LOCALE_UNAVAILABLE: &str = "no-locale";

/// User-agent strings longer than this are truncated before hashing.
const USER_AGENT_MAX_LEN: usize = 100;

/// One device signal source. `read` never panics and never errors — an
/// unavailable source returns its sentinel.
pub trait SignalProbe: Send + Sync {
    /// Stable signal name, used for ordering diagnostics and lookups.
    fn name(&self) -> &'static str;

    /// Current signal value, or the probe's sentinel.
    fn read(&self) -> String;
}

/// A probe with a fixed value. Used by embeddings that acquire a signal
/// through their own platform APIs, and by tests.
pub struct FixedProbe {
    name: &'static str,
    value: String,
}

impl FixedProbe {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

impl SignalProbe for FixedProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn read(&self) -> String {
        self.value.clone()
    }
}

// ── Host probes ────────────────────────────────────────────────────

/// Display geometry. A headless native process has no display to query.
pub struct ScreenProbe;

impl SignalProbe for ScreenProbe {
    fn name(&self) -> &'static str {
        "screen"
    }

    fn read(&self) -> String {
        SCREEN_UNAVAILABLE.to_string()
    }
}

/// Timezone: `TZ` env, else `/etc/timezone`, else the local UTC offset.
pub struct TimezoneProbe;

impl SignalProbe for TimezoneProbe {
    fn name(&self) -> &'static str {
        "timezone"
    }

    fn read(&self) -> String {
        if let Ok(tz) = std::env::var("TZ") {
            if !tz.trim().is_empty() {
                return tz.trim().to_string();
            }
        }
        if let Ok(tz) = std::fs::read_to_string("/etc/timezone") {
            if !tz.trim().is_empty() {
                return tz.trim().to_string();
            }
        }
        chrono::Local::now().offset().to_string()
    }
}

/// Locale from `LC_ALL` / `LANG`.
pub struct LocaleProbe;

impl SignalProbe for LocaleProbe {
    fn name(&self) -> &'static str {
        "locale"
    }

    fn read(&self) -> String {
        for var in ["LC_ALL", "LANG"] {
            if let Ok(locale) = std::env::var(var) {
                if !locale.trim().is_empty() {
                    return locale.trim().to_string();
                }
            }
        }
        LOCALE_UNAVAILABLE.to_string()
    }
}

/// Platform string: OS and architecture, compile-time constants.
pub struct PlatformProbe;

impl SignalProbe for PlatformProbe {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn read(&self) -> String {
        format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Synthesized user-agent for the native host, truncated like a browser UA.
/// Includes the hostname: stable per device, distinct across devices.
pub struct UserAgentProbe;

impl SignalProbe for UserAgentProbe {
    fn name(&self) -> &'static str {
        "user_agent"
    }

    fn read(&self) -> String {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown-host".to_string());
        let ua = format!(
            "latchkey/{} ({}; {}; {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
            host,
        );
        truncate_user_agent(&ua)
    }
}

/// Canvas rendering digest. No rendering surface on a native host.
pub struct CanvasProbe;

impl SignalProbe for CanvasProbe {
    fn name(&self) -> &'static str {
        "canvas"
    }

    fn read(&self) -> String {
        CANVAS_UNAVAILABLE.to_string()
    }
}

/// WebGL renderer/vendor digest. No GL context on a native host.
pub struct WebGlProbe;

impl SignalProbe for WebGlProbe {
    fn name(&self) -> &'static str {
        "webgl"
    }

    fn read(&self) -> String {
        WEBGL_UNAVAILABLE.to_string()
    }
}

/// Audio processing digest. Acquisition is asynchronous on platforms that
/// have it at all; the host probe resolves the ambiguity by always reading
/// the sentinel, deterministically.
pub struct AudioProbe;

impl SignalProbe for AudioProbe {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn read(&self) -> String {
        AUDIO_UNAVAILABLE.to_string()
    }
}

/// Truncate a user-agent string to the fixed hashing length.
pub fn truncate_user_agent(ua: &str) -> String {
    ua.chars().take(USER_AGENT_MAX_LEN).collect()
}
