//! Account entity
//!
//! A user's identity plus mutable monetary balance. The balance is only
//! ever mutated by the ledger engine; the `version` counter backs the
//! store's optimistic concurrency check.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Balance;

/// Balance granted to every account at registration.
const STARTING_BALANCE: i64 = 500;

/// An account holder: identity fields plus the current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Unique, looked up case-insensitively.
    pub email: String,
    pub display_name: String,
    pub balance: Balance,
    /// Incremented on every committed balance mutation.
    pub version: i64,
}

impl Account {
    /// Open a new account with the fixed starting balance.
    ///
    /// Registration itself (password handling, uniqueness checks against
    /// the credential store) happens outside this crate; callers hand us
    /// the already-verified identity fields.
    pub fn open(id: Uuid, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            display_name: display_name.into(),
            balance: Balance::new(Decimal::from(STARTING_BALANCE))
                .expect("starting balance constant is valid"),
            version: 0,
        }
    }
}
