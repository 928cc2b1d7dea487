//! Ledger Storage
//!
//! Storage adapters behind a unit-of-work abstraction.
//!
//! # Architecture
//!
//! ```text
//! TransferEngine ──▶ AtomicExecutor::run(op) ──▶ Store::begin() ──▶ UnitOfWork
//!                                                                   ├─ AccountRepository
//!                                                                   ├─ EntryLedger
//!                                                                   └─ TransferLog
//! ```
//!
//! Every repository call goes through a [`UnitOfWork`] bound to one
//! transaction. Dropping a unit of work without `commit` discards all of
//! its effects, which is what makes panics and cancellation safe.
//!
//! Backends translate their native errors into [`StoreError`]; callers
//! never see driver types.

pub mod executor;
pub mod memory;
pub mod postgres;

pub use executor::AtomicExecutor;
pub use memory::{FailPoint, MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgTx};

use async_trait::async_trait;
use thiserror::Error;

use crate::account::{Account, Currency, Page};
use crate::core_types::{AccountId, EntryId, MinorUnits, TransferId};
use crate::transfer::types::{Entry, Transfer};

/// Storage-adapter error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account already exists for owner '{owner}' in {currency}")]
    DuplicateAccount { owner: String, currency: String },

    /// Concurrent writers collided; the whole unit of work may be retried
    #[error("Write conflict, transaction must be retried")]
    Conflict,

    #[error("Storage error: {0}")]
    Internal(String),
}

impl StoreError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

/// Point reads and writes of account rows
#[async_trait]
pub trait AccountRepository: Send {
    async fn create_account(
        &mut self,
        owner: &str,
        currency: &Currency,
        balance: MinorUnits,
    ) -> Result<Account, StoreError>;

    /// Non-locking read of the latest visible state
    async fn get(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Read and hold an exclusive row lock until the unit of work ends
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Atomic `balance += delta`. Never clamps: a negative result is stored as-is.
    async fn add_balance(&mut self, id: AccountId, delta: MinorUnits)
    -> Result<Account, StoreError>;

    async fn list_by_owner(&mut self, owner: &str, page: Page)
    -> Result<Vec<Account>, StoreError>;
}

/// Append-only per-account balance deltas
#[async_trait]
pub trait EntryLedger: Send {
    async fn append_entry(
        &mut self,
        account_id: AccountId,
        amount: MinorUnits,
    ) -> Result<Entry, StoreError>;

    async fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>, StoreError>;

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, StoreError>;

    /// Sum of every entry for the account (0 when it has none)
    async fn entry_sum(&mut self, account_id: AccountId) -> Result<MinorUnits, StoreError>;
}

/// Append-only record of completed transfers
#[async_trait]
pub trait TransferLog: Send {
    async fn append_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
    ) -> Result<Transfer, StoreError>;

    async fn get_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    /// Transfers sent by `from_account_id` or received by `to_account_id`
    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError>;
}

/// One transaction: all three repositories plus its outcome
#[async_trait]
pub trait UnitOfWork: AccountRepository + EntryLedger + TransferLog + Send {
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Factory for units of work
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(StoreError::Conflict.is_retryable());
        assert!(!StoreError::AccountNotFound(1).is_retryable());
        assert!(!StoreError::Internal("io".into()).is_retryable());
        assert!(
            !StoreError::DuplicateAccount {
                owner: "alice".into(),
                currency: "USD".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StoreError::AccountNotFound(42).to_string(),
            "Account 42 not found"
        );
    }
}
