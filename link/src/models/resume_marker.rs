//! Opaque stream position token.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a delivered value, handed back to the transport on
/// reconnection so the stream resumes after it instead of from the start.
///
/// The core never interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeMarker(String);

impl ResumeMarker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResumeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResumeMarker {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResumeMarker {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ResumeMarker {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}
