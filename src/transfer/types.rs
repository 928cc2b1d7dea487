//! Transfer Core Types
//!
//! Ledger rows (entries, transfers) and the request/result pair that
//! crosses the engine boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::core_types::{AccountId, EntryId, MinorUnits, TransferId};

/// One signed balance delta for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    /// Negative for debit, positive for credit
    pub amount: MinorUnits,
    pub created_at: DateTime<Utc>,
}

/// Record of one completed funds movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Always positive
    pub amount: MinorUnits,
    pub created_at: DateTime<Utc>,
}

/// Transfer request from the handling layer
///
/// The caller has already authenticated the request and checked that it
/// owns `from_account_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Minor units, must be > 0
    pub amount: MinorUnits,
    pub currency: String,
}

impl TransferRequest {
    pub fn new(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
            currency: currency.into(),
        }
    }
}

/// Outcome of a committed transfer, serialized as-is by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    /// Post-update state
    pub from_account: Account,
    /// Post-update state
    pub to_account: Account,
}

/// Balance vs. entry-sum comparison for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub balance: MinorUnits,
    pub entry_sum: MinorUnits,
    pub consistent: bool,
}

impl Reconciliation {
    pub fn new(account_id: AccountId, balance: MinorUnits, entry_sum: MinorUnits) -> Self {
        Self {
            account_id,
            balance,
            entry_sum,
            consistent: balance == entry_sum,
        }
    }
}
