//! Object cache: the external key/value store holding scene state.
//!
//! Two kinds of keys live here: a scene id maps to its serialized
//! [`crate::domain::ObjectIdentifierSet`], and `"{scene_id}/{object_id}"`
//! maps to the raw encoded object. [`ObjectCache`] wraps a concrete
//! backend and bounds every round-trip with a deadline; [`SceneStore`]
//! layers the scene semantics on top.

pub mod memory;
pub mod postgres;
pub mod scene_store;

use std::future::Future;
use std::time::Duration;

pub use memory::MemoryCache;
pub use postgres::PostgresCache;
pub use scene_store::SceneStore;

use crate::error::RelayError;

/// Concrete key/value backend.
#[derive(Debug, Clone)]
pub enum CacheBackend {
    /// In-process map.
    Memory(MemoryCache),
    /// PostgreSQL key/value table.
    Postgres(PostgresCache),
}

/// Key/value access with a bounded round-trip per operation.
///
/// Failures are surfaced, never retried.
#[derive(Debug, Clone)]
pub struct ObjectCache {
    backend: CacheBackend,
    timeout: Duration,
}

impl ObjectCache {
    /// Wraps `backend`, bounding each call by `timeout`.
    #[must_use]
    pub fn new(backend: CacheBackend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// In-memory cache with the given deadline.
    #[must_use]
    pub fn in_memory(timeout: Duration) -> Self {
        Self::new(CacheBackend::Memory(MemoryCache::new()), timeout)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, RelayError>>,
    ) -> Result<T, RelayError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| RelayError::CacheTimeout)?
    }

    /// Reads a key; `None` if absent.
    ///
    /// # Errors
    ///
    /// [`RelayError::Cache`] on backend failure, [`RelayError::CacheTimeout`]
    /// past the deadline.
    pub async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        match &self.backend {
            CacheBackend::Memory(cache) => self.bounded(cache.get(key)).await,
            CacheBackend::Postgres(cache) => self.bounded(cache.get(key)).await,
        }
    }

    /// Writes a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectCache::get`].
    pub async fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        match &self.backend {
            CacheBackend::Memory(cache) => self.bounded(cache.set(key, value)).await,
            CacheBackend::Postgres(cache) => self.bounded(cache.set(key, value)).await,
        }
    }

    /// Writes a key only if it is absent. Returns `true` if written.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectCache::get`].
    pub async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, RelayError> {
        match &self.backend {
            CacheBackend::Memory(cache) => self.bounded(cache.set_if_absent(key, value)).await,
            CacheBackend::Postgres(cache) => self.bounded(cache.set_if_absent(key, value)).await,
        }
    }

    /// Deletes a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectCache::get`].
    pub async fn delete(&self, key: &str) -> Result<bool, RelayError> {
        match &self.backend {
            CacheBackend::Memory(cache) => self.bounded(cache.delete(key)).await,
            CacheBackend::Postgres(cache) => self.bounded(cache.delete(key)).await,
        }
    }

    /// Releases backend resources.
    pub async fn close(&self) {
        if let CacheBackend::Postgres(cache) = &self.backend {
            cache.close().await;
        }
    }
}
