//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "scene not registered: abc123"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`RelayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                  |
/// |-----------|---------------------|------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request / 404        |
/// | 2000–2999 | Scene state         | 422 Unprocessable Entity     |
/// | 3000–3999 | Server              | 500 Internal Server Error    |
/// | 5000–5999 | Resource exhaustion | 503 Service Unavailable      |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Request body is not a valid object container.
    #[error("malformed object: {0}")]
    MalformedObject(String),

    /// Path segment is not a well-formed scene or client identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The scene has no identifier set in the cache.
    #[error("scene not registered: {0}")]
    SceneNotRegistered(String),

    /// The scene's identifier set could not be read from the cache.
    #[error("scene state unreadable for {scene_id}: {reason}")]
    SceneStateUnreadable {
        /// Scene whose set could not be read.
        scene_id: String,
        /// Underlying cache failure.
        reason: String,
    },

    /// The cached identifier set could not be parsed.
    #[error("corrupt identifier set for scene {scene_id}: {reason}")]
    CorruptIdentifierSet {
        /// Scene whose set failed to parse.
        scene_id: String,
        /// Parse failure description.
        reason: String,
    },

    /// Object cache round-trip failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// Object cache did not answer within the configured deadline.
    #[error("cache operation timed out")]
    CacheTimeout,

    /// The registry worker is no longer accepting requests.
    #[error("registry unavailable")]
    RegistryUnavailable,

    /// Every generated identifier collided with an existing one.
    #[error("identifier allocation exhausted after {attempts} attempts")]
    ExhaustedRetries {
        /// Number of identifiers generated before giving up.
        attempts: u32,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedObject(_) => 1001,
            Self::InvalidId(_) => 1002,
            Self::SceneNotRegistered(_) => 2001,
            Self::SceneStateUnreadable { .. } => 2002,
            Self::Internal(_) => 3000,
            Self::Cache(_) => 3001,
            Self::CorruptIdentifierSet { .. } => 3002,
            Self::CacheTimeout => 3003,
            Self::RegistryUnavailable => 3004,
            Self::ExhaustedRetries { .. } => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedObject(_) => StatusCode::BAD_REQUEST,
            Self::InvalidId(_) => StatusCode::NOT_FOUND,
            Self::SceneNotRegistered(_) | Self::SceneStateUnreadable { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::CorruptIdentifierSet { .. }
            | Self::Cache(_)
            | Self::CacheTimeout
            | Self::RegistryUnavailable
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExhaustedRetries { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_table() {
        assert_eq!(
            RelayError::MalformedObject("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::SceneNotRegistered("abcdef".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            RelayError::SceneStateUnreadable {
                scene_id: "abcdef".into(),
                reason: "pool timed out".into(),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            RelayError::Cache("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::ExhaustedRetries { attempts: 10 }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RelayError::InvalidId("ab".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn into_response_sets_status() {
        let response = RelayError::CacheTimeout.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = RelayError::ExhaustedRetries { attempts: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn error_codes_are_distinct() {
        let errors = [
            RelayError::MalformedObject(String::new()),
            RelayError::InvalidId(String::new()),
            RelayError::SceneNotRegistered(String::new()),
            RelayError::SceneStateUnreadable {
                scene_id: String::new(),
                reason: String::new(),
            },
            RelayError::CorruptIdentifierSet {
                scene_id: String::new(),
                reason: String::new(),
            },
            RelayError::Cache(String::new()),
            RelayError::CacheTimeout,
            RelayError::RegistryUnavailable,
            RelayError::ExhaustedRetries { attempts: 0 },
            RelayError::Internal(String::new()),
        ];
        let mut codes: Vec<u32> = errors.iter().map(RelayError::error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
