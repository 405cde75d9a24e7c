//! Domain module
//!
//! Core domain types and business logic.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod token;
pub mod transfer;

pub use account::Account;
pub use amount::{Amount, AmountError, Balance};
pub use context::ClientContext;
pub use error::DomainError;
pub use token::{AccessClaims, RefreshToken, TokenPair};
pub use transfer::TransferRecord;
