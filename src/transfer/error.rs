//! Transfer Error Types
//!
//! Every variant carries enough context (ids, currencies, balances) for the
//! handling layer to build its own message and status code.

use thiserror::Error;

use crate::account::{Currency, ValidationError};
use crate::core_types::{AccountId, MinorUnits, TransferId};
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Account Errors ===
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account [{account_id}] currency mismatch: {actual} vs {expected}")]
    CurrencyMismatch {
        account_id: AccountId,
        expected: Currency,
        actual: Currency,
    },

    #[error(
        "Account [{account_id}] has insufficient funds: available {available}, requested {requested}"
    )]
    InsufficientFunds {
        account_id: AccountId,
        available: MinorUnits,
        requested: MinorUnits,
    },

    // === Concurrency Errors ===
    /// Still conflicting after the retry budget was spent
    #[error("Transfer aborted after {attempts} conflicting attempt(s)")]
    Conflict { attempts: u32 },

    #[error("Transfer deadline exceeded")]
    DeadlineExceeded,

    #[error("Transfer cancelled by caller")]
    Cancelled,

    // === Lookup Errors ===
    #[error("Transfer {0} not found")]
    TransferNotFound(TransferId),

    // === System Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Stable code for the handling layer's error mapping
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::Conflict { .. } => "CONFLICT",
            TransferError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            TransferError::Cancelled => "CANCELLED",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::Internal(_) => "INTERNAL",
        }
    }

    /// Only write conflicts are worth another attempt
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Conflict { .. })
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => TransferError::AccountNotFound(id),
            StoreError::Conflict => TransferError::Conflict { attempts: 1 },
            StoreError::DuplicateAccount { .. } | StoreError::Internal(_) => {
                TransferError::Internal(e.to_string())
            }
        }
    }
}

impl From<ValidationError> for TransferError {
    fn from(e: ValidationError) -> Self {
        TransferError::InvalidRequest(e.to_string())
    }
}
