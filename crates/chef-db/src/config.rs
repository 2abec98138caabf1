use std::env;
use std::time::Duration;

/// Database configuration.
///
/// Reads `CHEF_DATABASE_URL` and `CHEF_DB_MAX_CONNECTIONS` from the
/// environment, falling back to a local `chef` database with a small pool.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections. Recipe units write concurrently,
    /// so this is the effective ceiling on parallel persistence.
    pub max_connections: u32,
    /// How long to wait for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/chef";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;
    const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Build a config from the environment.
    pub fn from_env() -> Self {
        let database_url =
            env::var("CHEF_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        let max_connections = env::var("CHEF_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS);
        Self {
            database_url,
            max_connections,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Build a config from an explicit URL with default pool sizing.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Database name: the last path segment of the URL, minus any query string.
    pub fn database_name(&self) -> Option<&str> {
        self.database_url
            .rsplit('/')
            .next()
            .map(|s| s.split('?').next().unwrap_or(s))
            .filter(|s| !s.is_empty())
    }

    /// URL of the `postgres` maintenance database on the same server, used
    /// to issue `CREATE DATABASE`.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
