//! ID logic management.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

const USER_ID_LENGTH: usize = 64;

/// Value object of a valid user identifier.
///
/// Identifiers are hex-encoded SHA-256 digests, see
/// [`crate::crypto::IdentityHasher::make_uid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Converts a [`String`] into a valid [`UserId`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the string is not exactly 64 hexadecimal characters.
    pub fn parse(id: impl AsRef<str>) -> Result<Self> {
        let trimmed = id.as_ref().trim();
        if trimmed.len() != USER_ID_LENGTH
            || !trimmed.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(DomainError::InvalidIdFormat);
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Garbage bag identifier, generated by the store on creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BagId(pub i64);

impl fmt::Display for BagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        let id = UserId::parse("AB".repeat(32)).unwrap();
        assert_eq!(id.as_str(), "ab".repeat(32));

        assert_eq!(UserId::parse("abc"), Err(DomainError::InvalidIdFormat));
        assert_eq!(
            UserId::parse("zz".repeat(32)),
            Err(DomainError::InvalidIdFormat)
        );
    }

    #[test]
    fn test_user_id_serde() {
        let id: UserId =
            serde_json::from_str(&format!("\"{}\"", "0f".repeat(32))).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{}\"", "0f".repeat(32)));
        assert!(serde_json::from_str::<UserId>("\"nope\"").is_err());
    }
}
