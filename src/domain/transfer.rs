//! Transfer record
//!
//! Immutable proof of one completed funds movement between two accounts.
//! Rows are append-only: once the ledger engine commits a transfer the
//! record is never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub amount: Amount,
}

impl TransferRecord {
    pub fn new(sender_id: Uuid, recipient_id: Uuid, amount: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            sender_id,
            recipient_id,
            amount,
        }
    }
}
