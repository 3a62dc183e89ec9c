//! Optimistic concurrency expectations for event streams.

use serde::{Deserialize, Serialize};

/// Optimistic concurrency expectation for a stream.
///
/// Stream versions are 0-based: a stream with `n` committed events is at
/// version `n - 1`, and an empty stream is at version `-1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Skip version checking.
    #[default]
    Any,
    /// Require the stream to be at an exact version.
    Exact(i64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: i64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    /// The expected version, if one was supplied.
    pub fn exact(self) -> Option<i64> {
        match self {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v),
        }
    }
}

impl From<Option<i64>> for ExpectedVersion {
    fn from(value: Option<i64>) -> Self {
        value.map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
    }
}
