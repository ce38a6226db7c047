//! Manage json web tokens.
//!
//! Two kinds of tokens are issued: short access tokens for the web
//! dashboard, and order tokens which act as a bearer capability to pick up
//! an order at the store counter.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::{Role, UserId};
use crate::error::{Result, ServerError};

pub const DEFAULT_AUDIENCE: &str = "binwise";
pub const ACCESS_EXPIRATION_TIME: i64 = 60 * 15; // 15 minutes.
pub const ORDER_EXPIRATION_TIME: i64 = 60 * 60 * 3; // 3 hours.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Access,
    Order,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    pub purpose: Purpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    name: String,
    audience: String,
    access_ttl: Duration,
    order_ttl: Duration,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("name", &self.name)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance signing with `secret`.
    pub fn new(name: &str, secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            access_ttl: Duration::seconds(ACCESS_EXPIRATION_TIME),
            order_ttl: Duration::seconds(ORDER_EXPIRATION_TIME),
        }
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Override token lifetimes.
    pub fn lifetimes(&mut self, access: Duration, order: Duration) {
        self.access_ttl = access;
        self.order_ttl = order;
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn order_ttl(&self) -> Duration {
        self.order_ttl
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(encode(&Header::new(self.algorithm), claims, &self.encoding)?)
    }

    fn claims(&self, sub: &UserId, purpose: Purpose, ttl: Duration, now: DateTime<Utc>) -> Claims {
        Claims {
            aud: self.audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.name.clone(),
            sub: sub.to_string(),
            purpose,
            role: None,
            order: None,
        }
    }

    /// Create an access token for a logged in user.
    pub fn create(&self, user: &UserId, role: Role, now: DateTime<Utc>) -> Result<String> {
        let mut claims = self.claims(user, Purpose::Access, self.access_ttl, now);
        claims.role = Some(role);
        self.sign(&claims)
    }

    /// Create a pickup capability for `order`, bought by `buyer`.
    pub fn create_order(&self, buyer: &UserId, order: i64, now: DateTime<Utc>) -> Result<String> {
        let mut claims = self.claims(buyer, Purpose::Order, self.order_ttl, now);
        claims.order = Some(order);
        self.sign(&claims)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str, purpose: Purpose) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.purpose != purpose {
            return Err(ServerError::Unauthorized);
        }
        Ok(claims)
    }
}
