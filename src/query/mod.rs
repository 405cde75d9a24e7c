//! Transaction Query Service
//!
//! Read-only projection over the transfer log for one account: optional
//! free-text filtering, sorting by date or amount, and offset/count
//! pagination with the pre-pagination total for paging UIs.

use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Balance, DomainError};
use crate::store::{
    AccountPage, AccountQuery, AccountSortBy, SortBy, SortOrder, Store, StoreError, TransferFilter,
    TransferPage, TransferQuery,
};

/// Caller-facing listing parameters before validation.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Free text: a decimal means exact amount match, anything else a
    /// substring match on the counterparty email.
    pub filter: Option<String>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
    pub start_index: Option<u64>,
    pub count: Option<u64>,
}

/// Caller-facing account-directory parameters before validation.
#[derive(Debug, Clone, Default)]
pub struct DirectoryParams {
    /// Case-insensitive substring over email and display name.
    pub filter: Option<String>,
    pub sort_by: Option<AccountSortBy>,
    pub sort_order: Option<SortOrder>,
    pub start_index: Option<u64>,
    pub count: Option<u64>,
}

/// Page size applied when the caller does not specify one.
const DEFAULT_COUNT: u64 = 20;

#[derive(Debug, Clone)]
pub struct TransactionQueryService<S> {
    store: S,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<S: Store> TransactionQueryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// List the transfers in which `account_id` participated as sender
    /// or recipient. Safe to call concurrently with ledger writes; a
    /// committed-state snapshot is read, never a half-written record.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        params: ListParams,
    ) -> Result<TransferPage, QueryError> {
        let count = params.count.unwrap_or(DEFAULT_COUNT);
        if count == 0 {
            return Err(DomainError::InvalidPage("count must be positive".to_string()).into());
        }

        let filter = params
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(parse_filter);

        let query = TransferQuery {
            account_id,
            filter,
            sort_by: params.sort_by.unwrap_or(SortBy::Date),
            sort_order: params.sort_order.unwrap_or(SortOrder::Asc),
            start_index: params.start_index.unwrap_or(0),
            count,
        };

        let page = self.store.list_transfers(&query).await?;

        tracing::debug!(
            %account_id,
            returned = page.entries.len(),
            total = page.total_count,
            "Transaction listing served"
        );

        Ok(page)
    }

    /// List the account directory: every account a transfer could be
    /// addressed to, with an optional substring filter over email and
    /// display name.
    pub async fn list_accounts(&self, params: DirectoryParams) -> Result<AccountPage, QueryError> {
        let count = params.count.unwrap_or(DEFAULT_COUNT);
        if count == 0 {
            return Err(DomainError::InvalidPage("count must be positive".to_string()).into());
        }

        let filter = params
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);

        let query = AccountQuery {
            filter,
            sort_by: params.sort_by.unwrap_or(AccountSortBy::Name),
            sort_order: params.sort_order.unwrap_or(SortOrder::Asc),
            start_index: params.start_index.unwrap_or(0),
            count,
        };

        let page = self.store.list_accounts(&query).await?;

        tracing::debug!(
            returned = page.entries.len(),
            total = page.total_count,
            "Account directory served"
        );

        Ok(page)
    }

    /// Current balance of one account.
    pub async fn account_balance(&self, account_id: Uuid) -> Result<Balance, QueryError> {
        let account = self
            .store
            .account_by_id(account_id)
            .await?
            .ok_or(DomainError::AccountNotFound(account_id))?;
        Ok(account.balance)
    }
}

/// Free-text filter dispatch: a parseable decimal is an exact amount
/// match, everything else matches the counterparty email.
fn parse_filter(raw: &str) -> TransferFilter {
    match Decimal::from_str(raw) {
        Ok(value) => TransferFilter::AmountEquals(value),
        Err(_) => TransferFilter::CounterpartyEmail(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_filter_decimal() {
        assert_eq!(
            parse_filter("60.50"),
            TransferFilter::AmountEquals(dec!(60.50))
        );
    }

    #[test]
    fn test_parse_filter_email_fragment() {
        assert_eq!(
            parse_filter("bob@"),
            TransferFilter::CounterpartyEmail("bob@".to_string())
        );
    }

    #[tokio::test]
    async fn test_zero_count_rejected() {
        let service = TransactionQueryService::new(crate::store::MemoryStore::new());
        let err = service
            .list_transactions(
                Uuid::new_v4(),
                ListParams {
                    count: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Domain(DomainError::InvalidPage(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_zero_count_rejected() {
        let service = TransactionQueryService::new(crate::store::MemoryStore::new());
        let err = service
            .list_accounts(DirectoryParams {
                count: Some(0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Domain(DomainError::InvalidPage(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_for_unknown_account() {
        let service = TransactionQueryService::new(crate::store::MemoryStore::new());
        let err = service.account_balance(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Domain(DomainError::AccountNotFound(_))
        ));
    }
}
