//! PostgreSQL store
//!
//! Production `Store` implementation over sqlx. Transfer commits and
//! token rotations run inside a single database transaction; balance
//! updates are guarded with `WHERE version = $expected` so a concurrent
//! writer surfaces as `ConcurrencyConflict` instead of a lost update,
//! and token rotation races are decided by the row-level guard on
//! `revoked_at IS NULL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Account, Amount, Balance, RefreshToken};

use super::{
    AccountEntry, AccountPage, AccountQuery, AccountSortBy, AccountUpdate, NewRefreshToken, Party,
    SortBy, SortOrder, Store, StoreError, TransferCommit, TransferEntry, TransferFilter,
    TransferPage, TransferQuery,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type AccountRow = (Uuid, String, String, Decimal, i64);

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let (id, email, display_name, balance, version) = row;
    Ok(Account {
        id,
        email,
        display_name,
        balance: Balance::new(balance)
            .map_err(|e| StoreError::Inconsistent(format!("stored balance for {id}: {e}")))?,
        version,
    })
}

/// Both balance updates of a commit, ordered by account id. Concurrent
/// opposite-direction transfers then acquire the two row locks in the
/// same order and cannot deadlock.
fn ordered_updates(commit: &TransferCommit) -> [&AccountUpdate; 2] {
    if commit.sender.account_id <= commit.recipient.account_id {
        [&commit.sender, &commit.recipient]
    } else {
        [&commit.recipient, &commit.sender]
    }
}

/// SQLSTATEs Postgres raises when it aborts one of two colliding
/// transactions: serialization_failure and deadlock_detected. Safe to
/// retry from the top.
fn is_lock_failure_code(code: Option<&str>) -> bool {
    matches!(code, Some("40001") | Some("40P01"))
}

fn is_lock_failure(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => is_lock_failure_code(db.code().as_deref()),
        _ => false,
    }
}

/// Escape LIKE wildcards in a user-supplied substring filter.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

const TRANSFER_FROM: &str = r#"
    FROM transfers t
    JOIN accounts s ON s.id = t.sender_id
    JOIN accounts r ON r.id = t.recipient_id
    WHERE (t.sender_id = $1 OR t.recipient_id = $1)
"#;

#[async_trait]
impl Store for PgStore {
    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, email, display_name, balance, version
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, email, display_name, balance, version
            FROM accounts
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, email, display_name, balance, version)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.balance.value())
        .bind(account.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                Err(StoreError::DuplicateEmail(account.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_transfer(&self, commit: TransferCommit) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for update in ordered_updates(&commit) {
            let result = sqlx::query(
                r#"
                UPDATE accounts
                SET balance = $2, version = version + 1
                WHERE id = $1 AND version = $3
                "#,
            )
            .bind(update.account_id)
            .bind(update.new_balance.value())
            .bind(update.expected_version)
            .execute(&mut *tx)
            .await;

            let rows_affected = match result {
                Ok(done) => done.rows_affected(),
                // An aborted colliding transaction is the same outcome as
                // a lost version race: the caller re-reads and retries.
                Err(e) if is_lock_failure(&e) => {
                    return Err(StoreError::ConcurrencyConflict {
                        account_id: update.account_id,
                        expected: update.expected_version,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            if rows_affected == 0 {
                // Dropping the transaction without commit rolls it back.
                return Err(StoreError::ConcurrencyConflict {
                    account_id: update.account_id,
                    expected: update.expected_version,
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO transfers (id, created_at, sender_id, recipient_id, amount)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(commit.record.id)
        .bind(commit.record.created_at)
        .bind(commit.record.sender_id)
        .bind(commit.record.recipient_id)
        .bind(commit.record.amount.value())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_transfers(&self, query: &TransferQuery) -> Result<TransferPage, StoreError> {
        let filter_sql = match &query.filter {
            None => "",
            Some(TransferFilter::AmountEquals(_)) => " AND t.amount = $2",
            Some(TransferFilter::CounterpartyEmail(_)) => {
                " AND (CASE WHEN t.sender_id = $1 THEN r.email ELSE s.email END) ILIKE $2"
            }
        };

        let count_sql = format!("SELECT COUNT(*) {TRANSFER_FROM} {filter_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(query.account_id);
        match &query.filter {
            None => {}
            Some(TransferFilter::AmountEquals(value)) => count_query = count_query.bind(*value),
            Some(TransferFilter::CounterpartyEmail(needle)) => {
                count_query = count_query.bind(format!("%{}%", escape_like(needle)))
            }
        }
        let total_count = count_query.fetch_one(&self.pool).await? as u64;

        let sort_col = match query.sort_by {
            SortBy::Date => "t.created_at",
            SortBy::Amount => "t.amount",
        };
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let (limit_ph, offset_ph) = if query.filter.is_some() {
            ("$3", "$4")
        } else {
            ("$2", "$3")
        };

        let rows_sql = format!(
            r#"
            SELECT t.id, t.created_at, t.amount,
                   s.id, s.email, s.display_name,
                   r.id, r.email, r.display_name
            {TRANSFER_FROM} {filter_sql}
            ORDER BY {sort_col} {direction}, t.id ASC
            LIMIT {limit_ph} OFFSET {offset_ph}
            "#
        );

        type EntryRow = (
            Uuid,
            DateTime<Utc>,
            Decimal,
            Uuid,
            String,
            String,
            Uuid,
            String,
            String,
        );
        let mut rows_query = sqlx::query_as::<_, EntryRow>(&rows_sql).bind(query.account_id);
        match &query.filter {
            None => {}
            Some(TransferFilter::AmountEquals(value)) => rows_query = rows_query.bind(*value),
            Some(TransferFilter::CounterpartyEmail(needle)) => {
                rows_query = rows_query.bind(format!("%{}%", escape_like(needle)))
            }
        }
        let rows = rows_query
            .bind(query.count as i64)
            .bind(query.start_index as i64)
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .into_iter()
            .map(
                |(id, created_at, amount, s_id, s_email, s_name, r_id, r_email, r_name)| {
                    Ok(TransferEntry {
                        id,
                        created_at,
                        amount: Amount::new(amount).map_err(|e| {
                            StoreError::Inconsistent(format!("stored amount for {id}: {e}"))
                        })?,
                        sender: Party {
                            id: s_id,
                            email: s_email,
                            display_name: s_name,
                        },
                        recipient: Party {
                            id: r_id,
                            email: r_email,
                            display_name: r_name,
                        },
                    })
                },
            )
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(TransferPage {
            entries,
            total_count,
        })
    }

    async fn list_accounts(&self, query: &AccountQuery) -> Result<AccountPage, StoreError> {
        let pattern = query
            .filter
            .as_deref()
            .map(|needle| format!("%{}%", escape_like(needle)));
        let filter_sql = if pattern.is_some() {
            " WHERE (email ILIKE $1 OR display_name ILIKE $1)"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) FROM accounts{filter_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern.clone());
        }
        let total_count = count_query.fetch_one(&self.pool).await? as u64;

        let sort_col = match query.sort_by {
            AccountSortBy::Name => "lower(display_name)",
            AccountSortBy::Email => "lower(email)",
            AccountSortBy::Balance => "balance",
        };
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let (limit_ph, offset_ph) = if pattern.is_some() {
            ("$2", "$3")
        } else {
            ("$1", "$2")
        };

        let rows_sql = format!(
            r#"
            SELECT id, email, display_name, balance
            FROM accounts{filter_sql}
            ORDER BY {sort_col} {direction}, id ASC
            LIMIT {limit_ph} OFFSET {offset_ph}
            "#
        );
        let mut rows_query = sqlx::query_as::<_, (Uuid, String, String, Decimal)>(&rows_sql);
        if let Some(pattern) = &pattern {
            rows_query = rows_query.bind(pattern.clone());
        }
        let rows = rows_query
            .bind(query.count as i64)
            .bind(query.start_index as i64)
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .into_iter()
            .map(|(id, email, display_name, balance)| AccountEntry {
                id,
                email,
                display_name,
                balance,
            })
            .collect();

        Ok(AccountPage {
            entries,
            total_count,
        })
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, token_hash, owner_account_id, issued_at, expires_at,
                 created_by_context, revoked_at, revoked_by_context, replaced_by_token_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.owner_account_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(&token.created_by_context)
        .bind(token.revoked_at)
        .bind(&token.revoked_by_context)
        .bind(token.replaced_by_token_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        type TokenRow = (
            Uuid,
            String,
            Uuid,
            DateTime<Utc>,
            DateTime<Utc>,
            String,
            Option<DateTime<Utc>>,
            Option<String>,
            Option<Uuid>,
        );
        let row: Option<TokenRow> = sqlx::query_as(
            r#"
            SELECT id, token_hash, owner_account_id, issued_at, expires_at,
                   created_by_context, revoked_at, revoked_by_context, replaced_by_token_id
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(
                id,
                token_hash,
                owner,
                issued_at,
                expires_at,
                created_by,
                revoked_at,
                revoked_by,
                replaced_by,
            )| {
                RefreshToken {
                    id,
                    token_hash,
                    owner_account_id: owner,
                    issued_at,
                    expires_at,
                    created_by_context: created_by,
                    revoked_at,
                    revoked_by_context: revoked_by,
                    replaced_by_token_id: replaced_by,
                }
            },
        ))
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        now: DateTime<Utc>,
        revoked_by: &str,
        replacement: NewRefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The guard on revoked_at/expires_at makes this a single-winner
        // compare-and-revoke: a concurrent replay of the same value sees
        // zero updated rows.
        let owner_account_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_by_context = $3, replaced_by_token_id = $4
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2
            RETURNING owner_account_id
            "#,
        )
        .bind(old_hash)
        .bind(now)
        .bind(revoked_by)
        .bind(replacement.id)
        .fetch_optional(&mut *tx)
        .await?;

        let owner_account_id = match owner_account_id {
            Some(owner) => owner,
            None => return Err(StoreError::TokenNotActive),
        };

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, token_hash, owner_account_id, issued_at, expires_at, created_by_context)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(replacement.id)
        .bind(&replacement.token_hash)
        .bind(owner_account_id)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .bind(&replacement.created_by_context)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RefreshToken {
            id: replacement.id,
            token_hash: replacement.token_hash,
            owner_account_id,
            issued_at: replacement.issued_at,
            expires_at: replacement.expires_at,
            created_by_context: replacement.created_by_context,
            revoked_at: None,
            revoked_by_context: None,
            replaced_by_token_id: None,
        })
    }

    async fn revoke_tokens_for_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        revoked_by: &str,
    ) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_by_context = $3
            WHERE owner_account_id = $1 AND revoked_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(account_id)
        .bind(now)
        .bind(revoked_by)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}
