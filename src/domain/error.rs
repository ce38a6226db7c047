//! Custom error handler for domain (core).

use crate::domain::id::{BagId, UserId};
use crate::domain::user::Role;

pub type Result<T> = std::result::Result<T, DomainError>;

/// Enum representing custom domain errors.
///
/// Every variant renders a human-readable reason: front-ends display these
/// strings as they are.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("role not supported: {role} users cannot {action}")]
    RoleNotSupported { role: Role, action: &'static str },

    #[error("garbage bag {0} already used")]
    BagAlreadyUsed(BagId),
    #[error("garbage bag {0} already checked")]
    BagAlreadyChecked(BagId),
    #[error("garbage bag {0} has not been used yet")]
    BagNotUsed(BagId),
    #[error("garbage bag {bag} does not belong to user {user}")]
    OwnerMismatch { bag: BagId, user: UserId },

    #[error("weekly disposal limit reached ({count} of {limit})")]
    DisposalLimitReached { count: u32, limit: u32 },

    #[error("insufficient score: {required} required, {available} available")]
    InsufficientScore { required: i64, available: i64 },
    #[error("insufficient stock: {requested} requested, {available} available")]
    InsufficientStock { requested: i32, available: i32 },
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("stock cannot exceed {max} units: {stock} in stock, {added} added")]
    StockOverflow { stock: i32, added: i32, max: i32 },
    #[error("score must not be negative and reputation must lie in 5..=1000, got {score} and {reputation}")]
    InvalidStanding { score: i64, reputation: i32 },

    #[error("unknown garbage category code {0}")]
    InvalidCategory(i16),
    #[error("unrecognized QR code payload")]
    InvalidPayload,
    #[error("user id must be 64 hexadecimal characters")]
    InvalidIdFormat,
    #[error("unknown role '{0}', expected 'normal' or 'manager'")]
    InvalidRole(String),

    #[error("no user is logged in at this station")]
    NoActiveSession,
    #[error("scan requires a {0}")]
    MissingIntent(&'static str),
}
