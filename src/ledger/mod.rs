//! Ledger Engine
//!
//! Applies a transfer exactly once, consistently, or rejects it with a
//! specific reason. The engine is the trust boundary: it re-validates
//! the amount and the self-transfer guard even when the client already
//! did, and it never leaves a partial debit or credit behind.

use std::time::Duration;

use uuid::Uuid;

use crate::domain::{Account, Amount, DomainError, TransferRecord};
use crate::store::{AccountUpdate, Store, StoreError, TransferCommit};

/// Bounded retries for optimistic-concurrency conflicts on the commit.
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
}

/// Errors surfaced by [`LedgerEngine::transfer`]: a business rejection
/// or an infrastructure failure from the store.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl<S: Store> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Transfer `amount` from `sender_id` to the account identified by
    /// `recipient` (an account id, or an email address if the string
    /// does not parse as a Uuid).
    ///
    /// On success exactly one [`TransferRecord`] has been appended and
    /// both balances updated, atomically. On any failure no state has
    /// changed, so the whole call is safe to retry.
    pub async fn transfer(
        &self,
        sender_id: Uuid,
        recipient: &str,
        amount: Amount,
    ) -> Result<TransferRecord, LedgerError> {
        let mut conflicts = 0;
        loop {
            match self.try_transfer(sender_id, recipient, amount).await {
                Ok(record) => return Ok(record),
                Err(LedgerError::Store(e)) if e.is_concurrency_conflict() => {
                    conflicts += 1;
                    if conflicts >= MAX_RETRIES {
                        // A contended account is a transient business
                        // condition, not an infrastructure failure.
                        return Err(DomainError::Conflict.into());
                    }
                    // Exponential backoff before re-reading the accounts
                    let delay = Duration::from_millis(50 * conflicts as u64);
                    tokio::time::sleep(delay).await;
                    tracing::warn!(
                        %sender_id,
                        "Balance version conflict, retrying (attempt {}/{})",
                        conflicts,
                        MAX_RETRIES
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single attempt: read both accounts at their current versions,
    /// validate, and commit with both version guards.
    async fn try_transfer(
        &self,
        sender_id: Uuid,
        recipient: &str,
        amount: Amount,
    ) -> Result<TransferRecord, LedgerError> {
        let sender = self
            .store
            .account_by_id(sender_id)
            .await
            .map_err(LedgerError::Store)?
            .ok_or(DomainError::SenderNotFound(sender_id))?;

        let recipient = self
            .resolve_recipient(recipient)
            .await?
            .ok_or_else(|| DomainError::RecipientNotFound(recipient.to_string()))?;

        if sender.id == recipient.id {
            return Err(DomainError::SelfTransfer.into());
        }

        if !sender.balance.is_sufficient_for(&amount) {
            return Err(DomainError::InsufficientFunds {
                available: sender.balance.value(),
                requested: amount.value(),
            }
            .into());
        }

        let sender_balance = sender.balance.debit(&amount).map_err(DomainError::from)?;
        let recipient_balance = recipient
            .balance
            .credit(&amount)
            .map_err(DomainError::from)?;

        let record = TransferRecord::new(sender.id, recipient.id, amount);
        let commit = TransferCommit {
            record: record.clone(),
            sender: AccountUpdate {
                account_id: sender.id,
                expected_version: sender.version,
                new_balance: sender_balance,
            },
            recipient: AccountUpdate {
                account_id: recipient.id,
                expected_version: recipient.version,
                new_balance: recipient_balance,
            },
        };

        self.store
            .commit_transfer(commit)
            .await
            .map_err(LedgerError::Store)?;

        tracing::info!(
            transfer_id = %record.id,
            sender_id = %record.sender_id,
            recipient_id = %record.recipient_id,
            amount = %record.amount,
            "Transfer committed"
        );

        Ok(record)
    }

    /// Resolve the recipient argument as an account id first, falling
    /// back to a case-insensitive email lookup.
    async fn resolve_recipient(&self, recipient: &str) -> Result<Option<Account>, LedgerError> {
        let account = match recipient.parse::<Uuid>() {
            Ok(id) => self.store.account_by_id(id).await,
            Err(_) => self.store.account_by_email(recipient).await,
        };
        account.map_err(LedgerError::Store)
    }
}
