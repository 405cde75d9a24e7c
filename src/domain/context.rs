//! Client Context
//!
//! Metadata about the caller of an operation, used for audit stamping
//! (refresh-token revocation records the originating address) and
//! request tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for an operation, carried from the request edge into the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContext {
    /// Originating network address as reported by the transport layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_addr: Option<String>,

    /// Correlation ID for request tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl ClientContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            client_addr: None,
            correlation_id: None,
        }
    }

    /// Create context with the originating address
    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// The address to stamp on revocation records.
    pub fn addr_or_unknown(&self) -> String {
        self.client_addr.clone().unwrap_or_else(|| "unknown".to_string())
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}
