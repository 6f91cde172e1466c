//! Wire types shared by the Evolution crates: stream events, roles, and ids.

mod event;
mod tool;

pub use event::{ChannelEvent, ChannelSink, StreamEvent};
pub use tool::ToolError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix applied to generated session identifiers.
pub const SESSION_ID_PREFIX: &str = "session_";

/// Opaque identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh `session_<hex>` identifier from a random UUID.
    pub fn generate() -> Self {
        Self(format!("{SESSION_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Accept a caller-supplied id verbatim; empty ids are rejected.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidSessionId> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(InvalidSessionId);
        }
        Ok(Self(value))
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Error returned when a session id is empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session id must not be empty")]
pub struct InvalidSessionId;

/// Speaker role for a turn in a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored input.
    User,
    /// Agent-authored response.
    Agent,
    /// Record of a tool invocation made during a turn.
    Tool,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::Tool => "tool",
        }
    }

    /// Parse a role from a lowercase string; unknown values map to `User`.
    pub fn parse(value: &str) -> Self {
        match value {
            "agent" | "assistant" => Role::Agent,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Role::parse(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, SESSION_ID_PREFIX, SessionId};
    use pretty_assertions::assert_eq;

    #[test]
    fn generated_session_ids_are_prefixed_hex() {
        let id = SessionId::generate();
        let suffix = id
            .as_str()
            .strip_prefix(SESSION_ID_PREFIX)
            .expect("prefix");
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert!(SessionId::generate() != id);
    }

    #[test]
    fn caller_ids_are_kept_verbatim() {
        let id = SessionId::parse("my-session").expect("id");
        assert_eq!(id.to_string(), "my-session");
        assert!(SessionId::parse("   ").is_err());
    }

    #[test]
    fn role_parses_and_formats() {
        assert_eq!(Role::parse("agent"), Role::Agent);
        assert_eq!(Role::parse("tool"), Role::Tool);
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::Agent.as_str(), "agent");
    }
}
