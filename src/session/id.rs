//! Session identifier type.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Opaque identity of a client session.
///
/// Identities are random v4 UUIDs rendered as 32 lowercase hex digits with
/// no separators. That string is what travels in the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a SessionId from a raw UUID.
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parse a client-supplied token, treating anything malformed as absent.
    pub fn parse_token(token: &str) -> Option<Self> {
        token.trim().parse().ok()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(SessionId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = SessionId::new();
            assert!(ids.insert(id), "Duplicate ID generated: {}", id);
        }
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_display_format() {
        let id = SessionId::from_uuid(Uuid::from_u128(255));
        assert_eq!(id.to_string(), "000000000000000000000000000000ff");
        assert_eq!(SessionId::new().to_string().len(), 32);
    }

    #[test]
    fn test_parse_token() {
        let id = SessionId::new();
        assert_eq!(SessionId::parse_token(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse_token(&format!(" {} ", id)), Some(id));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(SessionId::parse_token("").is_none());
        assert!(SessionId::parse_token("sess-000000ff").is_none());
        assert!(SessionId::parse_token("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_none());
    }
}
