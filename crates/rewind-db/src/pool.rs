//! Connection pool shared by the document collections and the history store.
//!
//! A recorded action holds no connection across its writes; each store call
//! checks one out, so the pool only needs to cover concurrent requests.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use rewind_core::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Seconds a store call waits for a free connection before failing.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::Config(
                "DB_ACQUIRE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Open the pool backing `Database`.
pub async fn connect_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    config.validate()?;
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Document and history store connected"
    );
    Ok(pool)
}

/// Pool occupancy as shown by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
}

impl PoolStatus {
    pub fn of(pool: &PgPool) -> Self {
        let status = Self {
            size: pool.size(),
            idle: pool.num_idle(),
        };
        if status.is_saturated() {
            warn!(
                subsystem = "db",
                component = "pool",
                pool_size = status.size,
                "Every store connection is checked out, recorded actions will queue"
            );
        }
        status
    }

    /// True when connections exist and none is idle.
    pub fn is_saturated(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_pool_and_zero_timeout() {
        assert!(matches!(
            PoolConfig::new().max_connections(0).validate(),
            Err(Error::Config(_))
        ));
        assert!(PoolConfig::new()
            .acquire_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PoolConfig::new().max_connections(1).validate().is_ok());
    }

    #[test]
    fn test_saturation() {
        assert!(PoolStatus { size: 4, idle: 0 }.is_saturated());
        assert!(!PoolStatus { size: 4, idle: 1 }.is_saturated());
        assert!(!PoolStatus { size: 0, idle: 0 }.is_saturated());
    }
}
