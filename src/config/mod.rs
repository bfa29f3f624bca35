//! Application configuration

pub mod settings;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use settings::{ConfigError, Settings};

const DEFAULT_API_URL: &str = "http://localhost:8010";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base URL of the job backend used by every tool except grammar correction
    pub api_url: String,
    /// Base URL used for grammar correction submissions and downloads
    pub grammar_api_url: String,
    pub data_dir: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("SAARTHI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let grammar_api_url = env::var("SAARTHI_GRAMMAR_API_URL").unwrap_or_else(|_| api_url.clone());

        let settings = match env::var("SAARTHI_CONFIG") {
            Ok(path) => Settings::from_file(&PathBuf::from(path))?,
            Err(_) => Settings::default(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            api_url: trim_base(api_url),
            grammar_api_url: trim_base(grammar_api_url),
            data_dir: env::var("SAARTHI_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            settings,
        })
    }

    /// Configuration pointing both backends at one base URL
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        let api_url = trim_base(api_url.into());
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            grammar_api_url: api_url.clone(),
            api_url,
            data_dir: PathBuf::from("./data"),
            settings: Settings::default(),
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
