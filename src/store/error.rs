//! Store Errors
//!
//! Error types for the persistence seam.

use uuid::Uuid;

/// Errors that can occur in the durable store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict on a balance update
    #[error("Concurrency conflict for account {account_id}: expected version {expected}")]
    ConcurrencyConflict { account_id: Uuid, expected: i64 },

    /// Email uniqueness violation on account insert
    #[error("An account with email {0} already exists")]
    DuplicateEmail(String),

    /// Refresh token rotation target was missing, revoked, or expired.
    /// Deliberately a single case so callers cannot tell which.
    #[error("Refresh token is not active")]
    TokenNotActive,

    /// A stored row references an account that does not exist
    #[error("Inconsistent store state: {0}")]
    Inconsistent(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}
