//! API module
//!
//! HTTP API endpoints and middleware. This layer is deliberately thin:
//! it binds requests, hands them to the core services, and renders the
//! results; every business rule lives below it.

pub mod middleware;
pub mod routes;

pub use routes::create_router;

use crate::ledger::LedgerEngine;
use crate::query::TransactionQueryService;
use crate::store::Store;
use crate::token::{AuthConfig, TokenService};

/// Shared application state: one service per subsystem, all over the
/// same store.
#[derive(Clone)]
pub struct AppState<S> {
    pub ledger: LedgerEngine<S>,
    pub query: TransactionQueryService<S>,
    pub tokens: TokenService<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, auth: &AuthConfig) -> Self {
        Self {
            ledger: LedgerEngine::new(store.clone()),
            query: TransactionQueryService::new(store.clone()),
            tokens: TokenService::new(store, auth),
        }
    }
}
