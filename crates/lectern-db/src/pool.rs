//! Connection pool construction for the element store.
//!
//! Pool sizing comes from [`PoolConfig`], either built in code or read from
//! `LECTERN_DB_*` environment variables.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use lectern_core::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

pub const ENV_MAX_CONNECTIONS: &str = "LECTERN_DB_MAX_CONNECTIONS";
pub const ENV_MIN_CONNECTIONS: &str = "LECTERN_DB_MIN_CONNECTIONS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "LECTERN_DB_CONNECT_TIMEOUT_SECS";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "LECTERN_DB_IDLE_TIMEOUT_SECS";
/// `0` disables connection recycling.
pub const ENV_MAX_LIFETIME_SECS: &str = "LECTERN_DB_MAX_LIFETIME_SECS";

/// Sizing and timeouts for the PostgreSQL pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits to acquire a connection.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections open indefinitely.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `LECTERN_DB_*` overrides from the process environment.
    ///
    /// Missing or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let max_lifetime = match number(ENV_MAX_LIFETIME_SECS) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.max_lifetime,
        };

        Self {
            max_connections: number(ENV_MAX_CONNECTIONS)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_connections),
            min_connections: number(ENV_MIN_CONNECTIONS)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.min_connections),
            connect_timeout: number(ENV_CONNECT_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            idle_timeout: number(ENV_IDLE_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime,
        }
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Minimum never exceeds maximum, and the pool keeps at least one slot.
    fn normalized(mut self) -> Self {
        self.max_connections = self.max_connections.max(1);
        if self.min_connections > self.max_connections {
            warn!(
                subsystem = "database",
                component = "pool",
                min_connections = self.min_connections,
                max_connections = self.max_connections,
                "min_connections exceeds max_connections, clamping"
            );
            self.min_connections = self.max_connections;
        }
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let config = config.normalized();
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Opening library element store pool"
    );

    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Library element store pool ready"
    );
    Ok(pool)
}

/// Emit pool occupancy; warns once every connection is checked out.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool occupancy"
    );

    if size > 0 && idle == 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "No idle connections left, requests may queue"
        );
    }
}
