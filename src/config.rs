//! Runtime configuration read from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TEMPLATES_PATH: &str = "storage/templates";
const DEFAULT_PROJECTS_PATH: &str = "storage/projects";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080/public/docs";
const DEFAULT_CONVERTER_BIN: &str = "soffice";
const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub templates_path: PathBuf,
    pub projects_path: PathBuf,
    pub public_base_url: String,
    pub converter_bin: String,
    pub converter_timeout: Duration,
    pub bind_address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            templates_path: PathBuf::from(DEFAULT_TEMPLATES_PATH),
            projects_path: PathBuf::from(DEFAULT_PROJECTS_PATH),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            converter_bin: DEFAULT_CONVERTER_BIN.to_string(),
            converter_timeout: Duration::from_secs(DEFAULT_CONVERTER_TIMEOUT_SECS),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let converter_timeout = match get("CONVERTER_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    log::warn!(
                        "Invalid CONVERTER_TIMEOUT_SECS '{}', using {}s",
                        raw,
                        DEFAULT_CONVERTER_TIMEOUT_SECS
                    );
                    defaults.converter_timeout
                }
            },
            None => defaults.converter_timeout,
        };

        Self {
            database_url: get("DATABASE_URL"),
            templates_path: get("TEMPLATES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.templates_path),
            projects_path: get("PROJECTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.projects_path),
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            converter_bin: get("CONVERTER_BIN").unwrap_or(defaults.converter_bin),
            converter_timeout,
            bind_address: get("BIND_ADDRESS").unwrap_or(defaults.bind_address),
        }
    }
}
