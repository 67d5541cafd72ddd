//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `BIZURY_BACKEND` - `memory`, `postgres` or `rest` (default: memory)
//! - `DATABASE_URL` - Postgres connection string, required for `postgres`
//! - `BIZURY_REST_URL` - base URL of the hosted data API, required for `rest`
//! - `BIZURY_SERVICE_KEY` - service key for the hosted data API, required for `rest`
//! - `BIZURY_DATA_DIR` - directory for device-local transaction logs (default: ./data)
//! - `HOST` - bind address (default: 0.0.0.0)
//! - `PORT` - listen port (default: 8083)
//! - `NATS_URL` - publish change events when set
//! - `SESSION_IDLE_SECS` - close per-user sessions idle this long (default: 1800)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which data service the stores talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Memory,
    Postgres,
    Rest,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            "rest" => Ok(Self::Rest),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Hosted data API credentials. `Debug` redacts the service key.
#[derive(Clone)]
pub struct RestSettings {
    pub base_url: String,
    pub service_key: String,
}

impl std::fmt::Debug for RestSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSettings")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct Settings {
    pub backend: Backend,
    /// Contains the database password.
    pub database_url: Option<String>,
    pub rest: Option<RestSettings>,
    pub data_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub nats_url: Option<String>,
    pub session_idle: Duration,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("backend", &self.backend)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("rest", &self.rest)
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("nats_url", &self.nats_url)
            .field("session_idle", &self.session_idle)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let backend = parse(&get, "BIZURY_BACKEND", Backend::Memory)?;
        let database_url = get("DATABASE_URL");
        if backend == Backend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".into()));
        }

        let rest = match backend {
            Backend::Rest => Some(RestSettings {
                base_url: required("BIZURY_REST_URL")?,
                service_key: required("BIZURY_SERVICE_KEY")?,
            }),
            _ => get("BIZURY_REST_URL")
                .zip(get("BIZURY_SERVICE_KEY"))
                .map(|(base_url, service_key)| RestSettings { base_url, service_key }),
        };

        Ok(Self {
            backend,
            database_url,
            rest,
            data_dir: get("BIZURY_DATA_DIR").map_or_else(|| PathBuf::from("./data"), PathBuf::from),
            host: parse(&get, "HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse(&get, "PORT", 8083)?,
            nats_url: get("NATS_URL"),
            session_idle: Duration::from_secs(parse(&get, "SESSION_IDLE_SECS", 1800)?),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.backend, Backend::Memory);
        assert_eq!(s.socket_addr().to_string(), "0.0.0.0:8083");
        assert_eq!(s.data_dir, PathBuf::from("./data"));
        assert!(s.rest.is_none());
        assert_eq!(s.session_idle, Duration::from_secs(1800));
    }

    #[test]
    fn test_backend_requirements() {
        assert!(matches!(settings(&[("BIZURY_BACKEND", "postgres")]), Err(ConfigError::MissingEnvVar(_))));
        assert!(matches!(
            settings(&[("BIZURY_BACKEND", "rest"), ("BIZURY_REST_URL", "https://api.bizury.example")]),
            Err(ConfigError::MissingEnvVar(key)) if key == "BIZURY_SERVICE_KEY"
        ));
        let s = settings(&[("BIZURY_BACKEND", "Postgres"), ("DATABASE_URL", "postgres://localhost/bizury")]).unwrap();
        assert_eq!(s.backend, Backend::Postgres);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(settings(&[("PORT", "eighty")]), Err(ConfigError::InvalidEnvVar(..))));
        assert!(matches!(settings(&[("BIZURY_BACKEND", "sqlite")]), Err(ConfigError::InvalidEnvVar(..))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let s = settings(&[
            ("BIZURY_BACKEND", "rest"),
            ("BIZURY_REST_URL", "https://api.bizury.example"),
            ("BIZURY_SERVICE_KEY", "sk-live-very-private"),
            ("DATABASE_URL", "postgres://admin:hunter2@db/bizury"),
        ])
        .unwrap();
        let printed = format!("{s:?}");
        assert!(!printed.contains("sk-live-very-private"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("api.bizury.example"));
    }
}
