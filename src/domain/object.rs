//! Drawable object envelope exchanged with clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One drawable/update unit pushed into a scene.
///
/// `id` is chosen by the sender and treated as opaque; keeping it unique
/// within a scene is the sender's job. Missing fields decode to their
/// zero values, so `{}` is a (useless but) valid container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ObjectContainer {
    /// Caller-chosen object identifier.
    #[serde(default)]
    pub id: i64,
    /// Application-defined object type (e.g. `"circle"`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Operation tag, see [`ObjectMethod`].
    #[serde(default)]
    pub method: String,
    /// Application-defined payload.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
}

/// Cache operation selected by [`ObjectContainer::method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectMethod {
    /// Add the object to the scene state (or replace it).
    Set,
    /// Drop the object from the scene state.
    Delete,
    /// Drop every object from the scene state.
    Clear,
    /// Anything else: broadcast only, no cache mutation.
    Other,
}

impl ObjectMethod {
    /// Maps the wire tag onto a method. Matching is exact.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "set" => Self::Set,
            "delete" => Self::Delete,
            "clear" => Self::Clear,
            _ => Self::Other,
        }
    }
}

impl ObjectContainer {
    /// Synthetic object sent to a client joining a scene with no cached
    /// objects, so it can tell "empty scene" from "nothing received yet".
    #[must_use]
    pub fn clear_marker() -> Self {
        Self {
            id: 0,
            kind: "clear".to_string(),
            method: String::new(),
            content: serde_json::Value::Null,
        }
    }

    /// Returns the parsed operation tag.
    #[must_use]
    pub fn method(&self) -> ObjectMethod {
        ObjectMethod::from_tag(&self.method)
    }
}
