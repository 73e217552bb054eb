//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `uplink.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - SerialConfig: Which device to read and how long one read may block.
//!     - PublishConfig: ThingSpeak endpoint, write key, cadence and timeout.
//!     - LoggingConfig: Log level and countdown verbosity.
//!     - StatusConfig: Optional read-only status server.
//!
//! ==============================================================================

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// environment variable that overrides `publish.write_key`
pub const WRITE_KEY_ENV: &str = "UPLINK_WRITE_KEY";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UplinkConfig {
    pub serial: SerialConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    /// longest a single read may block before the loop checks the clock
    pub read_timeout_ms: u64,
    /// replay source (stdin when unset); used when no uart is compiled in
    pub replay_file: Option<PathBuf>,
    /// minimum gap between replayed lines, 0 = as fast as they can be read
    pub replay_pace_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PublishConfig {
    pub url: String,
    pub write_key: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    /// log the payload instead of sending it
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// print the once-per-second countdown at info instead of debug
    pub show_countdown: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB1".to_string(),
            baud: 9600,
            read_timeout_ms: 200,
            replay_file: None,
            replay_pace_ms: 1000,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            url: "https://api.thingspeak.com/update".to_string(),
            write_key: "KEY".to_string(),
            interval_seconds: 15,
            timeout_seconds: 10,
            dry_run: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_countdown: true }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { enabled: true, bind: "0.0.0.0:3000".to_string() }
    }
}

/// where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// no usable file; `skipped` lists files that existed but failed to load
    Defaults { skipped: Vec<(PathBuf, String)> },
}

impl UplinkConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: UplinkConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Load an explicitly requested file, or search the default locations
    /// and fall back to defaults.
    ///
    /// An explicit path that cannot be loaded is an error; a broken file in a
    /// default location is skipped and reported through [`ConfigOrigin`].
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<(Self, ConfigOrigin)> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            return Ok((config, ConfigOrigin::File(path.to_path_buf())));
        }

        let paths = [
            PathBuf::from("config").join("uplink.toml"),
            PathBuf::from("..").join("config").join("uplink.toml"),
        ];

        let mut skipped = Vec::new();
        for path in paths {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return Ok((config, ConfigOrigin::File(path))),
                    Err(e) => skipped.push((path, format!("{:#}", e))),
                }
            }
        }

        Ok((Self::default(), ConfigOrigin::Defaults { skipped }))
    }

    /// Apply environment overrides (currently only the write key).
    pub fn apply_env(&mut self) {
        self.apply_write_key(std::env::var(WRITE_KEY_ENV).ok());
    }

    fn apply_write_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.publish.write_key = key.trim().to_string();
        }
    }

    /// Reject values that would make the loop spin or never publish.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.publish.interval_seconds == 0 {
            bail!("publish.interval_seconds must be greater than zero");
        }
        if self.publish.timeout_seconds == 0 {
            bail!("publish.timeout_seconds must be greater than zero");
        }
        if self.serial.read_timeout_ms == 0 {
            bail!("serial.read_timeout_ms must be greater than zero");
        }
        if self.publish.url.trim().is_empty() && !self.publish.dry_run {
            bail!("publish.url must not be empty");
        }
        Ok(())
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.publish.interval_seconds)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish.timeout_seconds)
    }

    pub fn read_window(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }

    pub fn replay_pace(&self) -> Duration {
        Duration::from_millis(self.serial.replay_pace_ms)
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            port = %self.serial.port,
            baud = self.serial.baud,
            read_timeout_ms = self.serial.read_timeout_ms,
            "serial"
        );
        tracing::info!(
            url = %self.publish.url,
            interval_s = self.publish.interval_seconds,
            timeout_s = self.publish.timeout_seconds,
            write_key_set = self.publish.write_key != PublishConfig::default().write_key,
            dry_run = self.publish.dry_run,
            "publish"
        );
        if self.status.enabled {
            tracing::info!(bind = %self.status.bind, "status server");
        }
    }
}
