//! In-process cache backend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::RelayError;

/// Key/value map shared by every clone of the handle.
///
/// Each call is atomic on its own key, matching what the relay assumes of
/// an external cache; nothing is atomic across keys.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a key.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the other backends.
    pub async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    /// Writes a key.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Writes a key if absent.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, RelayError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    /// Deletes a key.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub async fn delete(&self, key: &str) -> Result<bool, RelayError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
