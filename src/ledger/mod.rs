//! Ledger access — observed incoming token transfers.

pub mod xrpl;

pub use xrpl::XrplClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A transfer seen on the ledger. Never mutated once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTransfer {
    /// Unique transaction identifier (hash).
    pub tx_id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: Decimal,
    pub currency: String,
    /// Issuer for issued tokens; `None` for the native asset.
    pub issuer: Option<String>,
    /// Every memo on the transaction that decodes as UTF-8.
    pub memos: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub ledger_index: u32,
}

/// Queries a ledger for transfers sent to an address.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Transfers received by `recipient` at or after `since`.
    ///
    /// An empty vec means "nothing yet"; failures are always `Err`.
    async fn query_transfers(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ObservedTransfer>, LedgerError>;
}
