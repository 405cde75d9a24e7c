//! Domain errors
//!
//! Business-rule rejections surfaced by the ledger engine, the query
//! service, and the token service. Infrastructure failures live in
//! `store::StoreError` and are mapped separately at the API edge.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::amount::AmountError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Sender not found: {0}")]
    SenderNotFound(Uuid),

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    #[error("Insufficient funds (available {available}, requested {requested})")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    // One variant for missing, expired, and revoked refresh tokens so the
    // rejection cannot reveal which case occurred.
    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Access token expired")]
    AccessTokenExpired,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Invalid page parameters: {0}")]
    InvalidPage(String),

    #[error("Concurrent modification detected, retries exhausted")]
    Conflict,
}
