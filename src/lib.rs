//! wingpay Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod ledger;
pub mod query;
pub mod store;
pub mod token;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{
    AccessClaims, Account, Amount, AmountError, Balance, ClientContext, DomainError, RefreshToken,
    TokenPair, TransferRecord,
};
pub use error::{AppError, AppResult};
pub use ledger::{LedgerEngine, LedgerError};
pub use query::{DirectoryParams, ListParams, TransactionQueryService};
pub use token::{AuthConfig, TokenService};
