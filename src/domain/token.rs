//! Session credentials
//!
//! Two token kinds back a session: a short-lived signed access token
//! (stateless, trusted until expiry) and a long-lived single-use refresh
//! token persisted by value hash. Rotating a refresh token revokes the
//! consumed row and links it to its replacement, forming a linear chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted refresh token row.
///
/// Only the sha-256 hash of the token value is stored; the raw value is
/// returned to the client once at issue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub owner_account_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Client context (originating address) recorded at issue time.
    pub created_by_context: String,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Client context (originating address) recorded at revocation.
    pub revoked_by_context: Option<String>,
    /// Set when this token was consumed by a rotation; points at the
    /// token issued in its place.
    pub replaced_by_token_id: Option<Uuid>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A token is active iff it has not been revoked and has not expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && !self.is_expired(now)
    }
}

/// Claims carried by a signed access token.
///
/// Field names follow JWT registered claim conventions; `iat` and `exp`
/// are unix timestamps as `jsonwebtoken` expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id.
    pub jti: Uuid,
    /// Display name.
    pub name: String,
    pub email: String,
}

/// The pair returned by initial issuance and by every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    /// Raw refresh token value, shown exactly once.
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}
