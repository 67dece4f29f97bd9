//! Pool settings from the environment.

use crate::{Error, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// libpq-style connection string or `postgres://` URL
    pub database_url: String,
    /// Maximum pooled connections; deadpool's default when unset
    pub max_size: Option<usize>,
}

impl PoolSettings {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: None,
        }
    }

    /// Builder: cap the pool size.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Read `DATABASE_URL` and `ROWSYNC_POOL_SIZE`, loading `.env` first if
    /// there is one.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_owned()))?;

        let max_size = match lookup("ROWSYNC_POOL_SIZE") {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("ROWSYNC_POOL_SIZE must be a positive integer, got {raw:?}: {e}"))
            })?),
            None => None,
        };
        if max_size == Some(0) {
            return Err(Error::Config("ROWSYNC_POOL_SIZE must be at least 1".to_owned()));
        }

        Ok(Self {
            database_url,
            max_size,
        })
    }

    /// Build a pool. No connection is opened until the first checkout.
    pub fn create_pool(&self) -> Result<Pool> {
        let pg_config: tokio_postgres::Config = self
            .database_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {e}")))?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);

        let mut builder = Pool::builder(mgr);
        if let Some(max_size) = self.max_size {
            builder = builder.max_size(max_size);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create pool: {e}")))?;

        tracing::debug!(max_size = pool.status().max_size, "created connection pool");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_requires_database_url() {
        let err = PoolSettings::from_lookup(lookup(&[])).unwrap_err();
        insta::assert_snapshot!(err, @"configuration error: DATABASE_URL is not set");
    }

    #[test]
    fn test_reads_pool_size() {
        let settings = PoolSettings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://app@localhost/app"),
            ("ROWSYNC_POOL_SIZE", " 8 "),
        ]))
        .unwrap();
        assert_eq!(
            settings,
            PoolSettings::new("postgres://app@localhost/app").max_size(8)
        );
    }

    #[test]
    fn test_rejects_bad_pool_size() {
        for raw in ["eight", "-1", "0"] {
            let err = PoolSettings::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/app"),
                ("ROWSYNC_POOL_SIZE", raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn test_create_pool_is_lazy() {
        let pool = PoolSettings::new("host=localhost user=app dbname=app")
            .max_size(3)
            .create_pool()
            .unwrap();
        assert_eq!(pool.status().max_size, 3);
        assert_eq!(pool.status().size, 0);
    }

    #[test]
    fn test_create_pool_rejects_bad_url() {
        let err = PoolSettings::new("host=localhost port=notaport").create_pool().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
