//! Store module
//!
//! The persistence seam. The core services talk to a `Store` — an
//! external durable collaborator providing account reads and writes,
//! append-only transfer records, refresh-token rows, and all-or-nothing
//! grouping of the mutations that must commit together.
//!
//! Two implementations: `PgStore` (PostgreSQL, production) and
//! `MemoryStore` (in-process, tests and demos).

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Amount, Balance, RefreshToken, TransferRecord};

/// One account's share of a transfer commit: the balance it must end up
/// with, guarded by the version observed when the balance was read.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub account_id: Uuid,
    pub expected_version: i64,
    pub new_balance: Balance,
}

/// Everything a successful transfer persists, committed atomically:
/// both balance updates plus the appended record, or nothing.
#[derive(Debug, Clone)]
pub struct TransferCommit {
    pub record: TransferRecord,
    pub sender: AccountUpdate,
    pub recipient: AccountUpdate,
}

/// Sort key for transfer listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Date,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filter applied to a transfer listing, already parsed by the query
/// service: a decimal filter string means exact amount match, anything
/// else matches the counterparty email as a substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFilter {
    AmountEquals(Decimal),
    CounterpartyEmail(String),
}

/// A fully resolved listing request handed to the store.
#[derive(Debug, Clone)]
pub struct TransferQuery {
    pub account_id: Uuid,
    pub filter: Option<TransferFilter>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub start_index: u64,
    pub count: u64,
}

/// Denormalized party fields for a transfer listing entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Party {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// One row of a transfer listing with both parties joined in.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransferEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub amount: Amount,
    pub sender: Party,
    pub recipient: Party,
}

/// A page of transfer entries plus the total match count before paging.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransferPage {
    pub entries: Vec<TransferEntry>,
    pub total_count: u64,
}

/// Sort key for the account directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountSortBy {
    Name,
    Email,
    Balance,
}

/// A fully resolved directory listing request.
#[derive(Debug, Clone)]
pub struct AccountQuery {
    /// Case-insensitive substring over email and display name.
    pub filter: Option<String>,
    pub sort_by: AccountSortBy,
    pub sort_order: SortOrder,
    pub start_index: u64,
    pub count: u64,
}

/// One row of the account directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccountEntry {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub balance: Decimal,
}

/// A page of directory entries plus the total match count before paging.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountPage {
    pub entries: Vec<AccountEntry>,
    pub total_count: u64,
}

/// Identity fields for the refresh token minted during a rotation. The
/// owner is inherited from the consumed token inside the same commit.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by_context: String,
}

/// The durable store capability consumed by the core services.
///
/// Mutating operations are transactional: each call either fully applies
/// or leaves no trace. `commit_transfer` and `rotate_refresh_token` are
/// additionally atomic with respect to concurrent callers touching the
/// same account or token value.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Case-insensitive email lookup.
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Insert a freshly opened account. Fails with `DuplicateEmail` if
    /// the email is already taken (case-insensitively).
    async fn insert_account(&self, account: Account) -> Result<(), StoreError>;

    /// Apply both balance updates and append the record, all or nothing.
    /// Fails with `ConcurrencyConflict` if either account's version has
    /// moved since it was read.
    async fn commit_transfer(&self, commit: TransferCommit) -> Result<(), StoreError>;

    /// Filtered, sorted, paginated listing of transfers where the query
    /// account is sender or recipient, with parties denormalized and the
    /// pre-pagination total.
    async fn list_transfers(&self, query: &TransferQuery) -> Result<TransferPage, StoreError>;

    /// Filtered, sorted, paginated listing of all accounts (the transfer
    /// recipient directory), with the pre-pagination total.
    async fn list_accounts(&self, query: &AccountQuery) -> Result<AccountPage, StoreError>;

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError>;

    async fn refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError>;

    /// Atomically consume the token identified by `old_hash` and issue
    /// its replacement: the old row is revoked (stamped with `now` and
    /// `revoked_by`) and linked to the new row, which inherits the
    /// owner. At most one concurrent caller presenting the same hash can
    /// win; the rest get `TokenNotActive`, as do callers presenting a
    /// missing, revoked, or expired token.
    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        now: DateTime<Utc>,
        revoked_by: &str,
        replacement: NewRefreshToken,
    ) -> Result<RefreshToken, StoreError>;

    /// Revoke every active refresh token owned by the account. Returns
    /// the number of tokens revoked; zero is not an error.
    async fn revoke_tokens_for_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        revoked_by: &str,
    ) -> Result<u64, StoreError>;
}
