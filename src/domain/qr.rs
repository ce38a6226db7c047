//! QR code payloads printed on user cards and garbage bags.
//!
//! The textual templates are shared with every printed code, so they must
//! stay readable across versions.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::domain::error::{DomainError, Result};
use crate::domain::id::{BagId, UserId};

pub const PAYLOAD_PREFIX: &str = "HGSSystem";

static PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^HGSSystem-(USER|GARBAGE):([0-9A-Za-z]+)-END$")
        .unwrap_or_else(|err| panic!("invalid QR payload pattern: {err}"))
});

/// Decoded content of a scanned code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    User(UserId),
    Bag(BagId),
}

impl ScanTarget {
    /// Decode a scanned payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let captures = PAYLOAD
            .captures(payload.trim())
            .ok_or(DomainError::InvalidPayload)?;

        let (kind, value) = match (captures.get(1), captures.get(2)) {
            (Some(kind), Some(value)) => (kind.as_str(), value.as_str()),
            _ => return Err(DomainError::InvalidPayload),
        };

        match kind {
            "USER" => Ok(Self::User(
                UserId::parse(value).map_err(|_| DomainError::InvalidPayload)?,
            )),
            "GARBAGE" => value
                .parse::<i64>()
                .map(|id| Self::Bag(BagId(id)))
                .map_err(|_| DomainError::InvalidPayload),
            _ => Err(DomainError::InvalidPayload),
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "{PAYLOAD_PREFIX}-USER:{id}-END"),
            Self::Bag(id) => write!(f, "{PAYLOAD_PREFIX}-GARBAGE:{id}-END"),
        }
    }
}
