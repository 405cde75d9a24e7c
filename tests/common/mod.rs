//! Common test utilities

#![allow(dead_code)]

use rust_decimal::Decimal;
use uuid::Uuid;

use wingpay::store::{MemoryStore, Store};
use wingpay::{Account, AuthConfig, Balance};

/// Signing config shared by the suites
pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "integration-test-secret".to_string(),
        access_token_minutes: 15,
        refresh_token_days: 7,
    }
}

/// Seed an account with the default starting balance (500.00)
pub async fn seed_account(store: &MemoryStore, email: &str, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_account(Account::open(id, email, name))
        .await
        .expect("seed account");
    id
}

/// Seed an account with an explicit balance
pub async fn seed_account_with_balance(
    store: &MemoryStore,
    email: &str,
    name: &str,
    balance: Decimal,
) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_account(Account {
            id,
            email: email.to_string(),
            display_name: name.to_string(),
            balance: Balance::new(balance).expect("valid balance"),
            version: 0,
        })
        .await
        .expect("seed account");
    id
}

/// Sum of all seeded accounts' balances, for conservation checks
pub async fn total_balance(store: &MemoryStore, ids: &[Uuid]) -> Decimal {
    let mut total = Decimal::ZERO;
    for id in ids {
        let account = store
            .account_by_id(*id)
            .await
            .expect("store read")
            .expect("account exists");
        total += account.balance.value();
    }
    total
}
