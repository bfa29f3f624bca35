//! Tunable behaviour loaded from an optional TOML file
//!
//! ```toml
//! [polling]
//! interval_ms = 1000
//! max_attempts = 600
//!
//! [correction]
//! interval_ms = 5000
//! max_attempts = 120
//!
//! [http]
//! timeout_secs = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::jobs::PollPolicy;

/// Root settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Status polling after a task submission
    #[serde(default)]
    pub polling: PollingSettings,

    /// Status polling done by the grammar correction view
    #[serde(default = "default_correction")]
    pub correction: PollingSettings,

    #[serde(default)]
    pub http: HttpSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load settings from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, polling) in [("polling", &self.polling), ("correction", &self.correction)] {
            if polling.interval_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "[{}] interval_ms must be greater than zero",
                    name
                )));
            }
            if polling.max_attempts == 0 {
                return Err(ConfigError::Validation(format!(
                    "[{}] max_attempts must be greater than zero",
                    name
                )));
            }
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "[http] timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            polling: PollingSettings::default(),
            correction: default_correction(),
            http: HttpSettings::default(),
        }
    }
}

fn default_correction() -> PollingSettings {
    PollingSettings {
        interval_ms: 5000,
        max_attempts: 120,
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollingSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(self.interval_ms), self.max_attempts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Whole-request timeout for submit/status/output calls.
    /// Streams are not subject to it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
