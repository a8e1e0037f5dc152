//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! `TRACEWATCH_*` environment variables (nested keys split on `__`, e.g.
//! `TRACEWATCH_RECONNECT__MAX_ATTEMPTS`), then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::{ReconnectPolicy, WatchSettings};
use crate::logging::LogConfig;

pub const DEFAULT_CONFIG_PATH: &str = "tracewatch.toml";
const ENV_PREFIX: &str = "TRACEWATCH_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Automatic retries after the stream errors; 0 keeps it one-shot.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    pub jobs_path: String,
    /// Prefix of the stored trace pages linked from the timeline.
    pub traces_path: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectConfig,
    pub log_json: bool,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    pub simulation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            jobs_path: "/jobs".to_string(),
            traces_path: "/traces".to_string(),
            poll_interval_ms: 3_000,
            request_timeout_secs: 10,
            reconnect: ReconnectConfig::default(),
            log_json: false,
            log_file: None,
            verbose: false,
            simulation: false,
        }
    }
}

impl AppConfig {
    /// Load from the default config file location.
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self> {
        Self::load(Path::new(DEFAULT_CONFIG_PATH), overrides)
    }

    /// Load with `path` as the config file. A missing file is not an error.
    pub fn load<T: Serialize>(path: &Path, overrides: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            bail!("api_url must not be empty");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.reconnect.multiplier < 1.0 {
            bail!("reconnect.multiplier must be at least 1.0");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
            },
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            json: self.log_json,
            verbose: self.verbose,
            file: self.log_file.clone(),
            quiet_console: false,
        }
    }
}
