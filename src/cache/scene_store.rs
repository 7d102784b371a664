//! Scene state on top of the object cache.
//!
//! A scene's "current state" is its identifier set plus one stored payload
//! per listed id. Updates are read-modify-write on the set key and are not
//! atomic across the two keys: two concurrent writers to the same scene can
//! lose one of their set updates. Object ids are caller-unique, so the
//! window only matters under concurrent sends to one scene.

use crate::cache::ObjectCache;
use crate::domain::short_id::{self, ID_LENGTH};
use crate::domain::{ObjectContainer, ObjectIdentifierSet, ObjectMethod, SceneId};
use crate::error::RelayError;

/// Cache key of one stored object.
#[must_use]
pub fn object_key(scene_id: &SceneId, object_id: i64) -> String {
    format!("{scene_id}/{object_id}")
}

/// Scene-level access to the object cache.
#[derive(Debug, Clone)]
pub struct SceneStore {
    cache: ObjectCache,
}

impl SceneStore {
    /// Wraps an object cache.
    #[must_use]
    pub fn new(cache: ObjectCache) -> Self {
        Self { cache }
    }

    /// Returns the underlying cache.
    #[must_use]
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Allocates a fresh scene id and seeds its empty identifier set.
    ///
    /// The seed is written with set-if-absent, so the existence check and
    /// the reservation are one cache operation.
    ///
    /// # Errors
    ///
    /// [`RelayError::ExhaustedRetries`] after `max_attempts` collisions,
    /// or a cache error.
    pub async fn register_scene(&self, max_attempts: u32) -> Result<SceneId, RelayError> {
        let scene_id = short_id::allocate(ID_LENGTH, max_attempts, |candidate| async move {
            let claimed = self.cache.set_if_absent(&candidate, "").await?;
            Ok(claimed.then(|| SceneId::from_generated(candidate)))
        })
        .await?;
        tracing::info!(%scene_id, "scene registered");
        Ok(scene_id)
    }

    /// Reads a scene's identifier set; `None` if the scene was never
    /// registered.
    ///
    /// # Errors
    ///
    /// [`RelayError::CorruptIdentifierSet`] if the stored list does not
    /// parse, or a cache error.
    pub async fn identifier_set(
        &self,
        scene_id: &SceneId,
    ) -> Result<Option<ObjectIdentifierSet>, RelayError> {
        let Some(raw) = self.cache.get(scene_id.as_str()).await? else {
            return Ok(None);
        };
        ObjectIdentifierSet::deserialize(&raw)
            .map(Some)
            .map_err(|err| RelayError::CorruptIdentifierSet {
                scene_id: scene_id.to_string(),
                reason: err.to_string(),
            })
    }

    /// Reads the set a mutation applies to. A set that cannot be fetched
    /// is reported as unreadable scene state rather than a server fault;
    /// a set that is fetched but does not parse stays a server fault.
    async fn registered_set(&self, scene_id: &SceneId) -> Result<ObjectIdentifierSet, RelayError> {
        match self.identifier_set(scene_id).await {
            Ok(Some(set)) => Ok(set),
            Ok(None) => Err(RelayError::SceneNotRegistered(scene_id.to_string())),
            Err(err @ (RelayError::Cache(_) | RelayError::CacheTimeout)) => {
                Err(RelayError::SceneStateUnreadable {
                    scene_id: scene_id.to_string(),
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn write_set(
        &self,
        scene_id: &SceneId,
        set: &ObjectIdentifierSet,
    ) -> Result<(), RelayError> {
        self.cache.set(scene_id.as_str(), &set.serialize()).await
    }

    /// Adds an object id to a registered scene's set.
    ///
    /// # Errors
    ///
    /// [`RelayError::SceneNotRegistered`] if the scene has no set,
    /// [`RelayError::SceneStateUnreadable`] if the set cannot be fetched,
    /// or a cache error on write.
    pub async fn add_identifier(&self, scene_id: &SceneId, object_id: i64) -> Result<(), RelayError> {
        let mut set = self.registered_set(scene_id).await?;
        if set.insert(object_id) {
            self.write_set(scene_id, &set).await?;
        }
        Ok(())
    }

    /// Removes an object id from a registered scene's set.
    ///
    /// # Errors
    ///
    /// Same as [`SceneStore::add_identifier`].
    pub async fn remove_identifier(
        &self,
        scene_id: &SceneId,
        object_id: i64,
    ) -> Result<(), RelayError> {
        let mut set = self.registered_set(scene_id).await?;
        if set.remove(object_id) {
            self.write_set(scene_id, &set).await?;
        }
        Ok(())
    }

    /// Stores an object's raw encoded payload.
    ///
    /// # Errors
    ///
    /// Returns a cache error.
    pub async fn store_object(
        &self,
        scene_id: &SceneId,
        object_id: i64,
        payload: &str,
    ) -> Result<(), RelayError> {
        self.cache.set(&object_key(scene_id, object_id), payload).await
    }

    /// Reads an object's stored payload.
    ///
    /// # Errors
    ///
    /// Returns a cache error.
    pub async fn load_object(
        &self,
        scene_id: &SceneId,
        object_id: i64,
    ) -> Result<Option<String>, RelayError> {
        self.cache.get(&object_key(scene_id, object_id)).await
    }

    /// Erases an object's stored payload.
    ///
    /// # Errors
    ///
    /// Returns a cache error.
    pub async fn erase_object(&self, scene_id: &SceneId, object_id: i64) -> Result<(), RelayError> {
        self.cache.delete(&object_key(scene_id, object_id)).await?;
        Ok(())
    }

    /// Empties a registered scene: the set becomes empty and every listed
    /// payload is erased. Returns how many ids were listed.
    ///
    /// # Errors
    ///
    /// Same as [`SceneStore::add_identifier`].
    pub async fn clear_scene(&self, scene_id: &SceneId) -> Result<usize, RelayError> {
        let set = self.registered_set(scene_id).await?;
        self.write_set(scene_id, &ObjectIdentifierSet::new()).await?;
        for object_id in set.iter() {
            self.erase_object(scene_id, object_id).await?;
        }
        Ok(set.len())
    }

    /// Applies an incoming object to the scene state according to its
    /// method. `raw` is the object exactly as received and is what replay
    /// sends back later. Unrecognized methods leave the cache untouched.
    ///
    /// # Errors
    ///
    /// [`RelayError::SceneNotRegistered`] or
    /// [`RelayError::SceneStateUnreadable`] for a mutating method whose
    /// scene set is absent or cannot be fetched, or a cache error on write.
    pub async fn apply(
        &self,
        scene_id: &SceneId,
        object: &ObjectContainer,
        raw: &str,
    ) -> Result<(), RelayError> {
        match object.method() {
            ObjectMethod::Set => {
                self.add_identifier(scene_id, object.id).await?;
                self.store_object(scene_id, object.id, raw).await
            }
            ObjectMethod::Delete => {
                self.remove_identifier(scene_id, object.id).await?;
                self.erase_object(scene_id, object.id).await
            }
            ObjectMethod::Clear => {
                let erased = self.clear_scene(scene_id).await?;
                tracing::debug!(%scene_id, erased, "scene cleared");
                Ok(())
            }
            ObjectMethod::Other => {
                tracing::debug!(%scene_id, method = %object.method, "method not cached, broadcast only");
                Ok(())
            }
        }
    }

    /// Returns the stored payload of every object in the scene's set, in
    /// ascending id order. A scene that was never registered replays as
    /// empty. Missing payloads are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails only if the identifier set itself cannot be read.
    pub async fn replay(&self, scene_id: &SceneId) -> Result<Vec<String>, RelayError> {
        let set = self.identifier_set(scene_id).await?.unwrap_or_default();
        let mut payloads = Vec::with_capacity(set.len());
        for object_id in set.iter() {
            match self.load_object(scene_id, object_id).await {
                Ok(Some(payload)) => payloads.push(payload),
                Ok(None) => {
                    tracing::warn!(%scene_id, object_id, "listed object has no stored payload");
                }
                Err(err) => {
                    tracing::warn!(%scene_id, object_id, error = %err, "failed to load object for replay");
                }
            }
        }
        Ok(payloads)
    }
}
