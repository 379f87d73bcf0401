//! Server configuration read from the environment.
//!
//! Environment variables:
//!   HOST                          - bind address (default: "0.0.0.0")
//!   PORT                          - bind port (default: 3000)
//!   STORE_BACKEND                 - "postgres" or "memory" (default: "postgres")
//!   DATABASE_URL                  - PostgreSQL URL (required for "postgres")
//!   DB_MAX_CONNECTIONS            - pool size (default: 10)
//!   DB_ACQUIRE_TIMEOUT_SECS       - wait for a free connection (default: 30)
//!   API_TOKENS                    - "token:user-uuid,token:user-uuid"
//!   HISTORY_MAX_AGE_SECS          - history retention age (default: 3600)
//!   HISTORY_MAX_ENTRIES_PER_USER  - history cap per user (default: 10)
//!   LOG_FORMAT / LOG_FILE / LOG_ANSI - see `logging`

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Duration;
use uuid::Uuid;

use rewind_core::defaults::{HISTORY_MAX_AGE_SECS, HISTORY_MAX_ENTRIES_PER_USER};
use rewind_core::{Error, Result, RetentionPolicy};
use rewind_db::pool::{DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS};
use rewind_db::PoolConfig;

use crate::logging::LogConfig;

/// Where documents and history are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!(
                "STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"
            ))),
        }
    }
}

/// Everything `main` needs to start the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub pool: PoolConfig,
    /// Bearer token → user id.
    pub api_tokens: HashMap<String, Uuid>,
    pub retention: RetentionPolicy,
    pub log: LogConfig,
}

impl ServerConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", lookup("PORT"), 3000u16)?;

        let store_backend = match lookup("STORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StoreBackend::Postgres,
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL is required when STORE_BACKEND=postgres".to_string(),
            ));
        }

        let max_connections = parse_or(
            "DB_MAX_CONNECTIONS",
            lookup("DB_MAX_CONNECTIONS"),
            DEFAULT_MAX_CONNECTIONS,
        )?;
        let acquire_timeout_secs = parse_or(
            "DB_ACQUIRE_TIMEOUT_SECS",
            lookup("DB_ACQUIRE_TIMEOUT_SECS"),
            DEFAULT_ACQUIRE_TIMEOUT_SECS,
        )?;
        let pool = PoolConfig::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(acquire_timeout_secs));
        pool.validate()?;

        let api_tokens = match lookup("API_TOKENS") {
            Some(raw) => parse_api_tokens(&raw)?,
            None => HashMap::new(),
        };

        let max_age_secs = parse_or(
            "HISTORY_MAX_AGE_SECS",
            lookup("HISTORY_MAX_AGE_SECS"),
            HISTORY_MAX_AGE_SECS,
        )?;
        let max_entries = parse_or(
            "HISTORY_MAX_ENTRIES_PER_USER",
            lookup("HISTORY_MAX_ENTRIES_PER_USER"),
            HISTORY_MAX_ENTRIES_PER_USER,
        )?;
        let max_age = Duration::try_seconds(max_age_secs).ok_or_else(|| {
            Error::Config(format!("HISTORY_MAX_AGE_SECS is out of range: {max_age_secs}"))
        })?;
        let retention = RetentionPolicy::new(max_age, max_entries)?;

        let log = LogConfig {
            format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            file: lookup("LOG_FILE"),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
        };

        Ok(Self {
            host,
            port,
            store_backend,
            database_url,
            pool,
            api_tokens,
            retention,
            log,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value '{raw}'"))),
    }
}

/// Parse `token:uuid` pairs separated by commas.
pub fn parse_api_tokens(raw: &str) -> Result<HashMap<String, Uuid>> {
    let mut tokens = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (token, user) = pair.split_once(':').ok_or_else(|| {
            Error::Config(format!("API_TOKENS entry '{pair}' must be 'token:user-uuid'"))
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Config("API_TOKENS contains an empty token".to_string()));
        }
        let user_id = Uuid::parse_str(user.trim()).map_err(|e| {
            Error::Config(format!("API_TOKENS user id for '{token}' is invalid: {e}"))
        })?;
        tokens.insert(token.to_string(), user_id);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_memory_backend_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("STORE_BACKEND", "memory")])).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.retention, RetentionPolicy::default());
        assert!(config.api_tokens.is_empty());
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let config =
            ServerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/rewind")]))
                .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_overrides() {
        let user = Uuid::now_v7();
        let tokens = format!("alpha:{user}");
        let config = ServerConfig::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("PORT", "8080"),
            ("API_TOKENS", tokens.as_str()),
            ("HISTORY_MAX_AGE_SECS", "60"),
            ("HISTORY_MAX_ENTRIES_PER_USER", "3"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_ACQUIRE_TIMEOUT_SECS", "5"),
            ("LOG_ANSI", "false"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_tokens.get("alpha"), Some(&user));
        assert_eq!(config.retention.max_age, Duration::seconds(60));
        assert_eq!(config.retention.max_entries_per_user, 3);
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.acquire_timeout, std::time::Duration::from_secs(5));
        assert_eq!(config.log.ansi, Some(false));
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("STORE_BACKEND", "mongo")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("PORT", "http"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("HISTORY_MAX_ENTRIES_PER_USER", "0"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("DB_ACQUIRE_TIMEOUT_SECS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn test_out_of_range_max_age_is_config_error() {
        let max = i64::MAX.to_string();
        for raw in [max.as_str(), "9000000000000"] {
            let err = ServerConfig::from_lookup(lookup(&[
                ("STORE_BACKEND", "memory"),
                ("HISTORY_MAX_AGE_SECS", raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{raw}: {err:?}");
        }
    }

    #[test]
    fn test_parse_api_tokens() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let tokens = parse_api_tokens(&format!(" one:{a} , two:{b},")).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["two"], b);

        assert!(parse_api_tokens("missing-colon").is_err());
        assert!(parse_api_tokens(":00000000-0000-0000-0000-000000000000").is_err());
        assert!(parse_api_tokens("t:not-a-uuid").is_err());
    }
}
