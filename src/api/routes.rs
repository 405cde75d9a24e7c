//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, ClientContext, DomainError};
use crate::error::AppResult;
use crate::query::{DirectoryParams, ListParams};
use crate::store::{AccountEntry, AccountSortBy, SortBy, SortOrder, Store, TransferEntry};

use super::middleware::AuthenticatedAccount;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

/// Posted by the external identity layer once it has verified the
/// caller's credentials.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Recipient account id, or an email address.
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub transfer_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default)]
    pub start_index: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransferEntry>,
    /// Total matches before pagination, for client paging UIs.
    pub total_count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub sort_by: Option<AccountSortBy>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default)]
    pub start_index: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<AccountEntry>,
    pub total_count: u64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked_tokens: u64,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router.
///
/// Session issuance and refresh are reachable without an access token:
/// the former is the hand-off point from the external identity layer,
/// the latter authenticates with the refresh token itself.
pub fn create_router<S: Store>(state: AppState<S>) -> Router {
    let public = Router::new()
        .route("/auth/session", post(create_session))
        .route("/auth/refresh", post(refresh_session));

    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/transfer", post(create_transfer))
        .route("/transactions", get(list_transactions))
        .route("/users", get(list_users))
        .route("/balance", get(get_balance))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            super::middleware::auth_middleware::<S>,
        ));

    public.merge(protected).with_state(state)
}

// =========================================================================
// POST /auth/session
// =========================================================================

/// Issue the initial access/refresh pair for a verified account
async fn create_session<S: Store>(
    State(state): State<AppState<S>>,
    Extension(context): Extension<ClientContext>,
    Json(request): Json<SessionRequest>,
) -> AppResult<(StatusCode, Json<TokenPairResponse>)> {
    let pair = state
        .tokens
        .issue_initial_tokens(request.account_id, &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            refresh_expires_at: pair.refresh_expires_at,
        }),
    ))
}

// =========================================================================
// POST /auth/refresh
// =========================================================================

/// Rotate a refresh token for a new pair
async fn refresh_session<S: Store>(
    State(state): State<AppState<S>>,
    Extension(context): Extension<ClientContext>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Json<TokenPairResponse>> {
    let pair = state.tokens.refresh(&request.refresh_token, &context).await?;

    Ok(Json(TokenPairResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        refresh_expires_at: pair.refresh_expires_at,
    }))
}

// =========================================================================
// POST /auth/logout
// =========================================================================

/// Revoke every active refresh token for the calling account
async fn logout<S: Store>(
    State(state): State<AppState<S>>,
    Extension(account): Extension<AuthenticatedAccount>,
    Extension(context): Extension<ClientContext>,
) -> AppResult<Json<LogoutResponse>> {
    let revoked_tokens = state.tokens.logout(account.account_id, &context).await?;

    Ok(Json(LogoutResponse { revoked_tokens }))
}

// =========================================================================
// POST /transfer
// =========================================================================

/// Transfer funds from the calling account to the named recipient
async fn create_transfer<S: Store>(
    State(state): State<AppState<S>>,
    Extension(account): Extension<AuthenticatedAccount>,
    Json(request): Json<TransferRequest>,
) -> AppResult<(StatusCode, Json<TransferResponse>)> {
    let amount: Amount = request
        .amount
        .parse()
        .map_err(DomainError::InvalidAmount)?;

    let record = state
        .ledger
        .transfer(account.account_id, &request.recipient, amount)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransferResponse {
            transfer_id: record.id,
            sender_id: record.sender_id,
            recipient_id: record.recipient_id,
            amount: record.amount.value(),
            created_at: record.created_at,
        }),
    ))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// Paginated, filterable, sortable history for the calling account
async fn list_transactions<S: Store>(
    State(state): State<AppState<S>>,
    Extension(account): Extension<AuthenticatedAccount>,
    Query(params): Query<TransactionsQuery>,
) -> AppResult<Json<TransactionsResponse>> {
    let page = state
        .query
        .list_transactions(
            account.account_id,
            ListParams {
                filter: params.filter,
                sort_by: params.sort_by,
                sort_order: params.sort_order,
                start_index: params.start_index,
                count: params.count,
            },
        )
        .await?;

    Ok(Json(TransactionsResponse {
        transactions: page.entries,
        total_count: page.total_count,
    }))
}

// =========================================================================
// GET /users
// =========================================================================

/// Account directory: who a transfer can be addressed to
async fn list_users<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<UsersQuery>,
) -> AppResult<Json<UsersResponse>> {
    let page = state
        .query
        .list_accounts(DirectoryParams {
            filter: params.filter,
            sort_by: params.sort_by,
            sort_order: params.sort_order,
            start_index: params.start_index,
            count: params.count,
        })
        .await?;

    Ok(Json(UsersResponse {
        users: page.entries,
        total_count: page.total_count,
    }))
}

// =========================================================================
// GET /balance
// =========================================================================

/// Current balance of the calling account
async fn get_balance<S: Store>(
    State(state): State<AppState<S>>,
    Extension(account): Extension<AuthenticatedAccount>,
) -> AppResult<Json<BalanceResponse>> {
    let balance = state.query.account_balance(account.account_id).await?;

    Ok(Json(BalanceResponse {
        account_id: account.account_id,
        balance: balance.value(),
    }))
}
