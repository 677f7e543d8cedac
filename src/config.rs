//! Settings read from the environment (and `.env` when present).

use std::{env, path::PathBuf, time::Duration};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/state.json";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    /// Classifier endpoint; without it every classification is simulated.
    pub classifier_url: Option<String>,
    pub chat_url: Option<String>,
    pub backend_timeout: Duration,
    /// Argon2 memory cost in KiB, for hosts that cannot afford the default.
    pub argon2_memory_kib: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            classifier_url: None,
            chat_url: None,
            backend_timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
            argon2_memory_kib: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            port: parse_or(non_empty("PORT"), "PORT", defaults.port)?,
            data_path: non_empty("APP_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            classifier_url: non_empty("CLASSIFIER_URL"),
            chat_url: non_empty("CHAT_URL"),
            backend_timeout: Duration::from_secs(parse_or(
                non_empty("BACKEND_TIMEOUT_SECS"),
                "BACKEND_TIMEOUT_SECS",
                DEFAULT_BACKEND_TIMEOUT_SECS,
            )?),
            argon2_memory_kib: non_empty("ARGON2_MEMORY_KIB")
                .map(|v| v.parse::<u32>().map_err(|_| ConfigError::Invalid("ARGON2_MEMORY_KIB", v)))
                .transpose()?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, raw)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
