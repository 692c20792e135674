//! Configuration for the bridge service.
//!
//! Loaded from TOML, then overridden by the environment variables the
//! deployment scripts already set (`SERIAL_PORT`, `PORT`, ...).

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use oled_core::{LinkConfig, RetryPolicy, SupervisorConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial link to the display.
    pub serial: SerialConfig,
    /// Panel geometry.
    pub display: DisplayConfig,
    /// Status endpoint.
    pub server: ServerConfig,
    /// Web search backend.
    pub search: SearchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Serial link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the microcontroller.
    pub port: String,
    pub baud_rate: u32,
    /// Keep reopening the port after it disappears.
    pub auto_reconnect: bool,
    /// Fixed wait between reopen attempts, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Pause between `reset` and `clear` after every open, in milliseconds.
    pub reset_settle_ms: u64,
}

/// Panel geometry in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port for `GET /status`.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_url: String,
    /// Bearer token. Empty means canned results.
    pub api_key: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".into(),
            baud_rate: 9600,
            auto_reconnect: true,
            reconnect_interval_ms: 5000,
            reset_settle_ms: 2000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: oled_core::DEFAULT_WIDTH,
            height: oled_core::DEFAULT_HEIGHT,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.perplexity.ai".into(),
            api_key: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERIAL_PORT").filter(|p| !p.is_empty()) {
            self.serial.port = port;
        }
        override_parsed(&lookup, "SERIAL_BAUD_RATE", &mut self.serial.baud_rate);
        override_parsed(&lookup, "DISPLAY_WIDTH", &mut self.display.width);
        override_parsed(&lookup, "DISPLAY_HEIGHT", &mut self.display.height);
        override_parsed(
            &lookup,
            "RECONNECT_INTERVAL_MS",
            &mut self.serial.reconnect_interval_ms,
        );
        override_parsed(&lookup, "PORT", &mut self.server.port);
        if let Some(flag) = lookup("AUTO_RECONNECT") {
            match parse_flag(&flag) {
                Some(on) => self.serial.auto_reconnect = on,
                None => tracing::warn!("ignoring AUTO_RECONNECT={flag}: not a boolean"),
            }
        }
        if let Some(key) = lookup("PERPLEXITY_API_KEY") {
            self.search.api_key = key;
        }
    }

    /// Convert serial settings into a `SupervisorConfig`.
    pub fn to_supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            link: LinkConfig::new(self.serial.port.clone(), self.serial.baud_rate),
            auto_reconnect: self.serial.auto_reconnect,
            reconnect_interval: Duration::from_millis(self.serial.reconnect_interval_ms.max(1)),
            reset_settle: Duration::from_millis(self.serial.reset_settle_ms),
            retry: RetryPolicy::default(),
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!("ignoring {key}={raw}: not a valid value"),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────
