//! bank_ledger - Transactional Funds-Transfer Engine
//!
//! Moves money between accounts with ACID guarantees and keeps a
//! double-entry audit trail of every movement.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AccountId, MinorUnits, etc.)
//! - [`account`] - Accounts, validation and the account service
//! - [`transfer`] - Transfer engine, retry policy and ledger queries
//! - [`store`] - Unit-of-work traits with PostgreSQL and in-memory backends
//! - [`db`] - PostgreSQL connection pool
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod config;
pub mod db;
pub mod logging;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountError, AccountService, Currency, ValidationError};
pub use core_types::{AccountId, EntryId, MinorUnits, TransferId};
pub use store::{AtomicExecutor, MemoryStore, PgStore, Store, StoreError, UnitOfWork};
pub use transfer::{
    Entry, LedgerReader, Reconciliation, RetryPolicy, Transfer, TransferEngine, TransferError,
    TransferRequest, TransferResult,
};
