//! Typed identifiers for streams and turns.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Name of a registered producer (e.g. `agent.A`, `tool.shell.1`, `user`,
/// `system.kernel`). Just a string underneath — the kernel doesn't
/// enforce a naming scheme, only uniqueness at registration time.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    /// Create a new stream id from anything that converts to `String`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier for a turn. A ULID rather than a plain string wrapper:
/// turn ids are assigned at `floor_grant` time and their lexicographic
/// order tracks grant order, which is useful for log inspection even
/// though `seq` remains the authoritative ordering.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(Ulid);

impl TurnId {
    /// Mint a new turn id from the current time and a random component.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Wrap an existing ULID (e.g. parsed from a JSONL line on replay).
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Parse from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
