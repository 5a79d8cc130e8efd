//! Monitor settings.
//!
//! Loaded from (in order of precedence):
//! 1. Environment variables prefixed with `LOCKIN_`, nested keys separated
//!    by `__` (e.g. `LOCKIN_SERVER__HOST=192.168.60.166`)
//! 2. A TOML file, `lockin-monitor.toml` by default
//! 3. Built-in defaults
//!
//! ```toml
//! [server]
//! host = "192.168.60.166"
//! port = 8004
//!
//! [channel]
//! frequency_hz = 1000.0
//! time_constant_s = 0.01
//! sample_rate_hz = 200.0
//!
//! [policy]
//! filter_order = 4
//! autorange = true
//!
//! [stream]
//! render_period_ms = 200
//! poll_duration_ms = 10
//! poll_timeout_ms = 500
//! ```

use crate::channel_config::{ChannelConfig, ChannelPolicy};
use crate::stream::StreamTiming;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SETTINGS_FILE: &str = "lockin-monitor.toml";
const ENV_PREFIX: &str = "LOCKIN_";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings load error: {0}")]
    Load(#[from] figment::Error),

    #[error("Settings validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8004,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub render_period_ms: u64,
    pub poll_duration_ms: u64,
    pub poll_timeout_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            render_period_ms: 200,
            poll_duration_ms: 10,
            poll_timeout_ms: 500,
        }
    }
}

impl StreamSettings {
    pub fn timing(&self) -> StreamTiming {
        StreamTiming {
            render_period: Duration::from_millis(self.render_period_ms),
            poll_duration: Duration::from_millis(self.poll_duration_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub server: ServerSettings,
    /// Initial contents of the numeric fields and their fallbacks.
    pub channel: ChannelConfig,
    pub policy: ChannelPolicy,
    pub stream: StreamSettings,
}

impl MonitorSettings {
    /// Load from `lockin-monitor.toml` in the working directory, if present.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(DEFAULT_SETTINGS_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        log::debug!("Loading settings from {}", path.display());

        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::Validation("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(SettingsError::Validation("server.port must not be 0".into()));
        }
        if !(1..=8).contains(&self.policy.filter_order) {
            return Err(SettingsError::Validation(format!(
                "policy.filter_order must be between 1 and 8, got {}",
                self.policy.filter_order
            )));
        }
        if self.stream.render_period_ms == 0 {
            return Err(SettingsError::Validation(
                "stream.render_period_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
