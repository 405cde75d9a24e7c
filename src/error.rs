//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::ledger::LedgerError;
use crate::query::QueryError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Missing or malformed Authorization header")]
    Unauthenticated,

    // Business-rule rejections
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Domain(e) => AppError::Domain(e),
            LedgerError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Domain(e) => AppError::Domain(e),
            QueryError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Domain(e) => AppError::Domain(e),
            TokenError::Store(e) => AppError::Store(e),
            TokenError::Signing(e) => AppError::Internal(format!("token signing: {e}")),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 401 Unauthorized
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated", None),

            // Business-rule rejections - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => match domain_err {
                DomainError::InvalidAmount(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(e.to_string()))
                }
                DomainError::SelfTransfer => {
                    (StatusCode::BAD_REQUEST, "self_transfer", None)
                }
                DomainError::InsufficientFunds { .. } => (
                    StatusCode::BAD_REQUEST,
                    "insufficient_funds",
                    Some(domain_err.to_string()),
                ),
                DomainError::InvalidPage(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_page", Some(msg.clone()))
                }
                DomainError::SenderNotFound(id) => {
                    (StatusCode::NOT_FOUND, "sender_not_found", Some(id.to_string()))
                }
                DomainError::RecipientNotFound(who) => {
                    (StatusCode::NOT_FOUND, "recipient_not_found", Some(who.clone()))
                }
                DomainError::AccountNotFound(id) => {
                    (StatusCode::NOT_FOUND, "account_not_found", Some(id.to_string()))
                }
                // Same code and no details for every refresh failure
                DomainError::InvalidToken => {
                    (StatusCode::UNAUTHORIZED, "invalid_token", None)
                }
                DomainError::AccessTokenExpired => {
                    (StatusCode::UNAUTHORIZED, "token_expired", None)
                }
                DomainError::InvalidAccessToken => {
                    (StatusCode::UNAUTHORIZED, "invalid_token", None)
                }
                DomainError::Conflict => (StatusCode::CONFLICT, "conflict", None),
            },

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
