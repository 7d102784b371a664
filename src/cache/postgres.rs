//! PostgreSQL cache backend.
//!
//! Stores every cache key as one row of a two-column table created on
//! startup if missing.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::RelayError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS object_cache (\
     key TEXT PRIMARY KEY, \
     value TEXT NOT NULL)";

/// PostgreSQL-backed cache using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresCache {
    pool: PgPool,
}

impl PostgresCache {
    /// Creates a backend over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool and makes sure the cache table exists.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Cache`] if the database is unreachable or the
    /// table cannot be created.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        let cache = Self::new(pool);
        cache.ensure_schema().await?;
        Ok(cache)
    }

    /// Creates the cache table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Cache`] on database failure.
    pub async fn ensure_schema(&self) -> Result<(), RelayError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Reads a key.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Cache`] on database failure.
    pub async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        let value =
            sqlx::query_scalar::<_, String>("SELECT value FROM object_cache WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Writes a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Cache`] on database failure.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        sqlx::query(
            "INSERT INTO object_cache (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes a key only if absent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Cache`] on database failure.
    pub async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, RelayError> {
        let result = sqlx::query(
            "INSERT INTO object_cache (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Deletes a key.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Cache`] on database failure.
    pub async fn delete(&self, key: &str) -> Result<bool, RelayError> {
        let result = sqlx::query("DELETE FROM object_cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Closes the pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
