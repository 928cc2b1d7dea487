//! Account management module
//!
//! Ledger accounts, their creation path and input validation.

pub mod error;
pub mod models;
pub mod service;
pub mod validation;

// Re-export commonly used types
pub use error::AccountError;
pub use models::Account;
pub use service::AccountService;
pub use validation::{Currency, Page, SUPPORTED_CURRENCIES, ValidationError, validate_owner};
