//! Short alphanumeric identifiers and bounded-retry allocation.
//!
//! Scenes and connections are both addressed by fixed-length identifiers
//! drawn uniformly from the 62-character alphanumeric alphabet. The
//! generator is not cryptographically secure: it only has to make casual
//! collisions unlikely. Collisions are resolved by [`allocate`], which
//! retries a bounded number of times and then fails with
//! [`RelayError::ExhaustedRetries`].

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Length of scene and connection identifiers.
pub const ID_LENGTH: usize = 6;

/// Returns `length` characters drawn uniformly from `[A-Za-z0-9]`.
#[must_use]
pub fn generate(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generates candidates until `try_claim` accepts one.
///
/// `try_claim` both checks and reserves the candidate in its collision
/// domain: it returns `Ok(Some(_))` once the candidate is taken by the
/// caller and `Ok(None)` if it was already in use.
///
/// # Errors
///
/// Returns [`RelayError::ExhaustedRetries`] after `max_attempts`
/// collisions, or the first error produced by `try_claim`.
pub async fn allocate<T, F, Fut>(
    length: usize,
    max_attempts: u32,
    mut try_claim: F,
) -> Result<T, RelayError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Option<T>, RelayError>>,
{
    for attempt in 1..=max_attempts {
        let candidate = generate(length);
        if let Some(claimed) = try_claim(candidate).await? {
            return Ok(claimed);
        }
        tracing::debug!(attempt, max_attempts, "generated identifier already in use");
    }
    tracing::warn!(max_attempts, "identifier allocation exhausted");
    Err(RelayError::ExhaustedRetries {
        attempts: max_attempts,
    })
}

/// Returns the first generated identifier for which `exists` reports
/// `false`.
///
/// Check and use are not atomic here; prefer [`allocate`] with a claiming
/// closure when the collision domain supports it.
///
/// # Errors
///
/// Same as [`allocate`].
pub async fn admit_with_retry<F, Fut>(
    length: usize,
    max_attempts: u32,
    mut exists: F,
) -> Result<String, RelayError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, RelayError>>,
{
    allocate(length, max_attempts, |candidate| {
        let check = exists(candidate.clone());
        async move { Ok((!check.await?).then_some(candidate)) }
    })
    .await
}

fn is_well_formed(raw: &str) -> bool {
    raw.len() == ID_LENGTH && raw.bytes().all(|b| b.is_ascii_alphanumeric())
}

macro_rules! short_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random identifier. Uniqueness is not
            /// checked; see [`allocate`].
            #[must_use]
            pub fn random() -> Self {
                Self(generate(ID_LENGTH))
            }

            /// Parses an identifier, rejecting anything that is not exactly
            /// six ASCII alphanumerics.
            ///
            /// # Errors
            ///
            /// Returns [`RelayError::InvalidId`] on a malformed value.
            pub fn parse(raw: &str) -> Result<Self, RelayError> {
                if is_well_formed(raw) {
                    Ok(Self(raw.to_string()))
                } else {
                    Err(RelayError::InvalidId(format!("{} {raw:?}", $what)))
                }
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub(crate) fn from_generated(raw: String) -> Self {
                debug_assert!(is_well_formed(&raw));
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = RelayError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = RelayError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

short_id!(
    /// Identifier of a scene: the broadcast domain clients join.
    SceneId,
    "scene id"
);

short_id!(
    /// Identifier of one live client connection.
    ClientId,
    "client id"
);
