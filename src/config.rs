//! Process configuration from the environment (optionally seeded from `.env`).

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8010;
const DEFAULT_SCENES_DIR: &str = "scenes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub scenes_dir: PathBuf,
}

impl Config {
    /// `PORT` (default 8010) and `SCENES_DIR` (default `scenes`).
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            scenes_dir: std::env::var("SCENES_DIR").map_or_else(|_| PathBuf::from(DEFAULT_SCENES_DIR), PathBuf::from),
        }
    }
}

/// Parse `key`, falling back to `default` when unset or unparsable.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparsable environment value; using default");
            default
        }),
        Err(_) => default,
    }
}
