//! # Configuration
//!
//! Runtime settings of the portal, resolved from (lowest to highest
//! precedence):
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`--config` or `SIS_CONFIG`)
//! 3. environment variables
//!
//! ## Environment Variables
//!
//! - `SIS_DATABASE`: path of the redb file
//! - `SIS_HOST` / `SIS_PORT`: bind address
//! - `SIS_ALLOWED_HOSTS`: accepted `Host` headers, comma or space separated; `*` allows all
//! - `SIS_CORS_ORIGINS`: allowed origins, or `*` for all (default: localhost only)
//! - `SIS_RATE_LIMIT`: requests per second (default: 100, 0 to disable)
//! - `SIS_SESSION_HOURS`: login lifetime (default: 12)
//! - `SIS_DEBUG`: `false` marks the session cookie `Secure`

use serde::Deserialize;
use sis_core::SisError;
use std::path::{Path, PathBuf};

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Default login lifetime in hours.
pub const DEFAULT_SESSION_HOURS: u32 = 12;

/// Portal settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: PathBuf,
    pub host: String,
    pub port: u16,
    pub allowed_hosts: Vec<String>,
    /// Empty means localhost only.
    pub cors_origins: Vec<String>,
    pub rate_limit: u32,
    pub session_hours: u32,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("sis.redb"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "[::1]".to_string(),
            ],
            cors_origins: Vec::new(),
            rate_limit: DEFAULT_RATE_LIMIT,
            session_hours: DEFAULT_SESSION_HOURS,
            debug: true,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    /// Resolve settings from the file named by `config` (or `SIS_CONFIG`)
    /// and the process environment.
    pub fn load(config: Option<&Path>) -> Result<Self, SisError> {
        let path = config
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SIS_CONFIG").ok().map(PathBuf::from));
        let file = match path {
            Some(path) => Some(std::fs::read_to_string(&path).map_err(|e| {
                SisError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
            })?),
            None => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Layer a TOML document and an environment lookup over the defaults.
    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SisError> {
        let mut settings = match file {
            Some(text) => toml::from_str::<Self>(text)
                .map_err(|e| SisError::SerializationError(format!("Invalid config: {}", e)))?,
            None => Self::default(),
        };

        if let Some(database) = env("SIS_DATABASE") {
            settings.database = PathBuf::from(database);
        }
        if let Some(host) = env("SIS_HOST") {
            settings.host = host;
        }
        if let Some(port) = env("SIS_PORT") {
            settings.port = port
                .trim()
                .parse()
                .map_err(|_| SisError::SerializationError(format!("Invalid SIS_PORT: {}", port)))?;
        }
        if let Some(hosts) = env("SIS_ALLOWED_HOSTS") {
            settings.allowed_hosts = split_list(&hosts);
        }
        if let Some(origins) = env("SIS_CORS_ORIGINS") {
            settings.cors_origins = split_list(&origins);
        }
        if let Some(limit) = env("SIS_RATE_LIMIT") {
            // Unparseable values keep the previous layer
            settings.rate_limit = limit.trim().parse().unwrap_or(settings.rate_limit);
        }
        if let Some(hours) = env("SIS_SESSION_HOURS") {
            settings.session_hours = hours.trim().parse().unwrap_or(settings.session_hours);
        }
        if let Some(debug) = env("SIS_DEBUG") {
            settings.debug = debug.trim().eq_ignore_ascii_case("true");
        }
        Ok(settings)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_sources(None, env_of(&[])).expect("settings");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_file_then_env() {
        let file = "port = 9000\nhost = \"0.0.0.0\"\nallowed_hosts = [\"school.example\"]\n";
        let settings = Settings::from_sources(
            Some(file),
            env_of(&[("SIS_PORT", "9100"), ("SIS_DEBUG", "False")]),
        )
        .expect("settings");
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.allowed_hosts, ["school.example"]);
        assert!(!settings.debug);
    }

    #[test]
    fn test_host_lists_accept_commas_and_spaces() {
        let settings = Settings::from_sources(
            None,
            env_of(&[("SIS_ALLOWED_HOSTS", "a.example, b.example c.example")]),
        )
        .expect("settings");
        assert_eq!(settings.allowed_hosts, ["a.example", "b.example", "c.example"]);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(Settings::from_sources(None, env_of(&[("SIS_PORT", "http")])).is_err());
        assert!(Settings::from_sources(Some("port = \"x\""), env_of(&[])).is_err());
    }
}
