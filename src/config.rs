use crate::transcript::DEFAULT_TRANSCRIPT_PREFIX;
use anyhow::{Result, bail};
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Where the default-resume pointer and legacy snapshot live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsBackend {
    Remote,
    Local,
}

impl SettingsBackend {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "remote" | "server" => Ok(Self::Remote),
            "local" | "device" => Ok(Self::Local),
            other => bail!("TAILOR_SETTINGS_BACKEND must be 'remote' or 'local', got '{other}'"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub settings_backend: SettingsBackend,
    /// Overrides the platform data directory for local storage.
    pub data_dir: Option<PathBuf>,
    pub transcript_prefix: String,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // a missing .env is fine
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("TAILOR_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            bail!("TAILOR_API_URL must be an http(s) URL, got '{api_url}'");
        }

        let settings_backend = match lookup("TAILOR_SETTINGS_BACKEND") {
            Some(raw) => SettingsBackend::parse(&raw)?,
            None => SettingsBackend::Remote,
        };

        Ok(Config {
            api_url,
            settings_backend,
            data_dir: lookup("TAILOR_DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            transcript_prefix: lookup("TAILOR_TRANSCRIPT_PREFIX")
                .unwrap_or_else(|| DEFAULT_TRANSCRIPT_PREFIX.to_string()),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}
