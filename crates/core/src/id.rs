//! Opaque tokens used by the subscription protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque lease token handed to `poll` and expected back by `ack`.
///
/// Stores only compare leases for equality; the content is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lease(String);

impl Lease {
    /// Generate a fresh, time-ordered lease token (UUIDv7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Lease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Lease {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Lease {
    fn from(value: String) -> Self {
        Self(value)
    }
}
