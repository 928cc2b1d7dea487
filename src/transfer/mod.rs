//! Funds Transfer
//!
//! ACID transfers between two accounts of the same currency.
//!
//! # Flow
//!
//! ```text
//! TransferRequest ─▶ TransferEngine::execute ─▶ AtomicExecutor::run ─▶ commit
//!                          │                          │
//!                          └── retry on Conflict ◀────┘
//! ```
//!
//! # Invariants
//!
//! 1. **Atomicity**: balances, both entries and the transfer record commit
//!    together or not at all
//! 2. **Conservation**: the two entries of a transfer sum to zero
//! 3. **No Overdraft**: the source balance never goes below zero
//! 4. **Lock Order**: account rows are locked in ascending id order

pub mod engine;
pub mod error;
pub mod queries;
pub mod retry;
pub mod types;


// Re-exports for convenience
pub use engine::{TransferEngine, lock_order};
pub use error::TransferError;
pub use queries::LedgerReader;
pub use retry::RetryPolicy;
pub use types::{Entry, Reconciliation, Transfer, TransferRequest, TransferResult};
