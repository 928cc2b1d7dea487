//! Core types used throughout the system
//!
//! Identifiers are the PostgreSQL `BIGSERIAL` keys of the ledger tables.

/// Account ID - globally unique, immutable after assignment.
///
/// # Constraints:
/// - **Positive**: valid ids start at 1
/// - **Totally ordered**: the transfer engine locks the smaller id first,
///   so the numeric order doubles as the global lock order
pub type AccountId = i64;

/// Entry ID - one per balance delta
pub type EntryId = i64;

/// Transfer ID - one per committed transfer
pub type TransferId = i64;

/// Amount in minor currency units (cents for USD).
///
/// Signed: entries carry negative deltas for debits.
pub type MinorUnits = i64;
