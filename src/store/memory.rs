//! In-memory store
//!
//! `Store` implementation backed by process memory. All state lives
//! behind a single async mutex, so every operation is trivially
//! all-or-nothing and concurrent callers serialize at the lock. Used by
//! the test suites and available for demos without a database.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Account, RefreshToken, TransferRecord};

use super::{
    AccountEntry, AccountPage, AccountQuery, AccountSortBy, NewRefreshToken, Party, SortBy,
    SortOrder, Store, StoreError, TransferCommit, TransferEntry, TransferFilter, TransferPage,
    TransferQuery,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    transfers: Vec<TransferRecord>,
    tokens: HashMap<Uuid, RefreshToken>,
    token_ids_by_hash: HashMap<String, Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn party(state: &State, id: Uuid) -> Result<Party, StoreError> {
    let account = state
        .accounts
        .get(&id)
        .ok_or_else(|| StoreError::Inconsistent(format!("transfer references account {id}")))?;
    Ok(Party {
        id: account.id,
        email: account.email.clone(),
        display_name: account.display_name.clone(),
    })
}

/// Counterparty of `account_id` on a record. Self-transfers are rejected
/// by the ledger engine, so sender and recipient always differ.
fn counterparty_id(record: &TransferRecord, account_id: Uuid) -> Uuid {
    if record.sender_id == account_id {
        record.recipient_id
    } else {
        record.sender_id
    }
}

fn matches_filter(
    state: &State,
    record: &TransferRecord,
    account_id: Uuid,
    filter: &TransferFilter,
) -> bool {
    match filter {
        TransferFilter::AmountEquals(value) => record.amount.value() == *value,
        TransferFilter::CounterpartyEmail(needle) => {
            let other = counterparty_id(record, account_id);
            state
                .accounts
                .get(&other)
                .map(|a| a.email.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false)
        }
    }
}

fn compare(a: &TransferRecord, b: &TransferRecord, sort_by: SortBy, order: SortOrder) -> Ordering {
    let primary = match sort_by {
        SortBy::Date => a.created_at.cmp(&b.created_at),
        SortBy::Amount => a.amount.value().cmp(&b.amount.value()),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    // Stable tiebreak so pagination windows never overlap.
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl Store for MemoryStore {
    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let state = self.inner.lock().await;
        let needle = email.to_lowercase();
        Ok(state
            .accounts
            .values()
            .find(|a| a.email.to_lowercase() == needle)
            .cloned())
    }

    async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let email = account.email.to_lowercase();
        if state
            .accounts
            .values()
            .any(|a| a.email.to_lowercase() == email)
        {
            return Err(StoreError::DuplicateEmail(account.email));
        }
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn commit_transfer(&self, commit: TransferCommit) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;

        // Validate both version guards before touching anything, so a
        // conflict on either side leaves the state untouched.
        for update in [&commit.sender, &commit.recipient] {
            let account = state.accounts.get(&update.account_id).ok_or_else(|| {
                StoreError::Inconsistent(format!("unknown account {}", update.account_id))
            })?;
            if account.version != update.expected_version {
                return Err(StoreError::ConcurrencyConflict {
                    account_id: update.account_id,
                    expected: update.expected_version,
                });
            }
        }

        for update in [&commit.sender, &commit.recipient] {
            let account = state
                .accounts
                .get_mut(&update.account_id)
                .expect("existence checked above");
            account.balance = update.new_balance;
            account.version += 1;
        }
        state.transfers.push(commit.record);
        Ok(())
    }

    async fn list_transfers(&self, query: &TransferQuery) -> Result<TransferPage, StoreError> {
        let state = self.inner.lock().await;

        let mut matches: Vec<&TransferRecord> = state
            .transfers
            .iter()
            .filter(|t| t.sender_id == query.account_id || t.recipient_id == query.account_id)
            .filter(|t| {
                query
                    .filter
                    .as_ref()
                    .map(|f| matches_filter(&state, t, query.account_id, f))
                    .unwrap_or(true)
            })
            .collect();

        matches.sort_by(|a, b| compare(a, b, query.sort_by, query.sort_order));

        let total_count = matches.len() as u64;
        let entries = matches
            .into_iter()
            .skip(query.start_index as usize)
            .take(query.count as usize)
            .map(|t| {
                Ok(TransferEntry {
                    id: t.id,
                    created_at: t.created_at,
                    amount: t.amount,
                    sender: party(&state, t.sender_id)?,
                    recipient: party(&state, t.recipient_id)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(TransferPage {
            entries,
            total_count,
        })
    }

    async fn list_accounts(&self, query: &AccountQuery) -> Result<AccountPage, StoreError> {
        let state = self.inner.lock().await;

        let needle = query.filter.as_deref().map(str::to_lowercase);
        let mut matches: Vec<&Account> = state
            .accounts
            .values()
            .filter(|a| match &needle {
                None => true,
                Some(needle) => {
                    a.email.to_lowercase().contains(needle)
                        || a.display_name.to_lowercase().contains(needle)
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            let primary = match query.sort_by {
                AccountSortBy::Name => a
                    .display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
                AccountSortBy::Email => a.email.to_lowercase().cmp(&b.email.to_lowercase()),
                AccountSortBy::Balance => a.balance.value().cmp(&b.balance.value()),
            };
            let primary = match query.sort_order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total_count = matches.len() as u64;
        let entries = matches
            .into_iter()
            .skip(query.start_index as usize)
            .take(query.count as usize)
            .map(|a| AccountEntry {
                id: a.id,
                email: a.email.clone(),
                display_name: a.display_name.clone(),
                balance: a.balance.value(),
            })
            .collect();

        Ok(AccountPage {
            entries,
            total_count,
        })
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        state
            .token_ids_by_hash
            .insert(token.token_hash.clone(), token.id);
        state.tokens.insert(token.id, token);
        Ok(())
    }

    async fn refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state
            .token_ids_by_hash
            .get(token_hash)
            .and_then(|id| state.tokens.get(id))
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        now: DateTime<Utc>,
        revoked_by: &str,
        replacement: NewRefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        let mut state = self.inner.lock().await;

        let old_id = *state
            .token_ids_by_hash
            .get(old_hash)
            .ok_or(StoreError::TokenNotActive)?;
        let old = state
            .tokens
            .get_mut(&old_id)
            .ok_or(StoreError::TokenNotActive)?;
        if !old.is_active(now) {
            return Err(StoreError::TokenNotActive);
        }

        old.revoked_at = Some(now);
        old.revoked_by_context = Some(revoked_by.to_string());
        old.replaced_by_token_id = Some(replacement.id);
        let owner_account_id = old.owner_account_id;

        let new_token = RefreshToken {
            id: replacement.id,
            token_hash: replacement.token_hash,
            owner_account_id,
            issued_at: replacement.issued_at,
            expires_at: replacement.expires_at,
            created_by_context: replacement.created_by_context,
            revoked_at: None,
            revoked_by_context: None,
            replaced_by_token_id: None,
        };
        state
            .token_ids_by_hash
            .insert(new_token.token_hash.clone(), new_token.id);
        state.tokens.insert(new_token.id, new_token.clone());

        Ok(new_token)
    }

    async fn revoke_tokens_for_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        revoked_by: &str,
    ) -> Result<u64, StoreError> {
        let mut state = self.inner.lock().await;
        let mut revoked = 0;
        for token in state.tokens.values_mut() {
            if token.owner_account_id == account_id && token.is_active(now) {
                token.revoked_at = Some(now);
                token.revoked_by_context = Some(revoked_by.to_string());
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
