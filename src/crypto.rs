//! Identity hashing and credential generation.

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::UserId;

const SECRET_LENGTH: usize = 16;
const NAME_SUFFIX_LENGTH: usize = 6;

/// Derives user identifiers from credentials.
///
/// The identifier both names a user and proves knowledge of its secret:
/// logging in recomputes it and looks the user up.
pub struct IdentityHasher {
    pepper: Vec<u8>,
}

impl IdentityHasher {
    /// Create a new [`IdentityHasher`].
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self {
            pepper: pepper.as_ref().to_vec(),
        }
    }

    /// Deterministic identifier of `name` + `secret`.
    pub fn make_uid(&self, name: &str, secret: &str) -> UserId {
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update(name.as_bytes());
        // Separator keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update([0u8]);
        hasher.update(secret.as_bytes());

        UserId::parse(hex::encode(hasher.finalize()))
            .unwrap_or_else(|_| unreachable!("sha256 hex digest is 64 characters"))
    }
}

/// Credentials handed out once on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub name: String,
    pub secret: String,
}

impl Credentials {
    /// Generate a random name (prefixed by `prefix`) and secret.
    pub fn random(prefix: &str) -> Self {
        let suffix = Alphanumeric.sample_string(&mut OsRng, NAME_SUFFIX_LENGTH);
        Self {
            name: format!("{prefix}-{}", suffix.to_lowercase()),
            secret: Alphanumeric.sample_string(&mut OsRng, SECRET_LENGTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_uid_is_deterministic() {
        let hasher = IdentityHasher::new(b"pepper");
        let a = hasher.make_uid("alice", "secret");
        assert_eq!(a, hasher.make_uid("alice", "secret"));
        assert_ne!(a, hasher.make_uid("alice", "secreT"));
        assert_ne!(hasher.make_uid("ab", "c"), hasher.make_uid("a", "bc"));
        assert_ne!(a, IdentityHasher::new(b"other").make_uid("alice", "secret"));
    }

    #[test]
    fn test_random_credentials() {
        let a = Credentials::random("user");
        let b = Credentials::random("user");
        assert!(a.name.starts_with("user-"));
        assert_eq!(a.secret.len(), SECRET_LENGTH);
        assert_ne!(a, b);
    }
}
