//! Input validation for currencies, owners and pagination
//!
//! Validated types keep their fields private so they can only be built
//! through the checking constructors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies an account may be opened in
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["USD", "EUR", "CAD"];

pub const MIN_PAGE_SIZE: i32 = 5;
pub const MAX_PAGE_SIZE: i32 = 10;

// ============================================================================
// Validation Errors
// ============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid currency code '{0}' (expected 3 uppercase letters)")]
    InvalidCurrency(String),

    #[error("Unsupported currency '{0}'")]
    UnsupportedCurrency(String),

    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("page_id must be >= 1, got {0}")]
    InvalidPageId(i32),

    #[error("page_size must be between 5 and 10, got {0}")]
    InvalidPageSize(i32),
}

// ============================================================================
// Currency
// ============================================================================

/// ISO-like 3-letter currency code, always uppercase.
///
/// Well-formedness is all `Currency` guarantees; whether new accounts may
/// use it is a separate check ([`Currency::ensure_supported`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// # Examples
    /// ```
    /// use bank_ledger::account::Currency;
    ///
    /// let usd = Currency::new("USD").unwrap();
    /// assert_eq!(usd.as_str(), "USD");
    /// assert!(Currency::new("usd").is_err());
    /// assert!(Currency::new("DOLLAR").is_err());
    /// ```
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(ValidationError::InvalidCurrency(code.to_string()))
        }
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn cad() -> Self {
        Self("CAD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_CURRENCIES.contains(&self.0.as_str())
    }

    pub fn ensure_supported(&self) -> Result<(), ValidationError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedCurrency(self.0.clone()))
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

// ============================================================================
// Owner
// ============================================================================

/// Validate an account owner name: 3-100 chars of `[A-Za-z0-9_]`
pub fn validate_owner(owner: &str) -> Result<(), ValidationError> {
    let len = owner.chars().count();
    if !(3..=100).contains(&len) {
        return Err(ValidationError::InvalidLength {
            field: "owner",
            min: 3,
            max: 100,
            actual: len,
        });
    }

    if !owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: "owner",
            value: owner.to_string(),
            expected: "letters, digits, underscore only",
        });
    }

    Ok(())
}

// ============================================================================
// Page
// ============================================================================

/// LIMIT/OFFSET window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Build from 1-based `page_id` and `page_size` in `5..=10`
    pub fn new(page_id: i32, page_size: i32) -> Result<Self, ValidationError> {
        if page_id < 1 {
            return Err(ValidationError::InvalidPageId(page_id));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ValidationError::InvalidPageSize(page_size));
        }
        Ok(Self {
            limit: page_size as i64,
            offset: (page_id as i64 - 1) * page_size as i64,
        })
    }

    /// Unbounded window, for internal scans
    pub fn all() -> Self {
        Self {
            limit: i64::MAX,
            offset: 0,
        }
    }

    pub(crate) fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        let skip = usize::try_from(self.offset).unwrap_or(0);
        let take = usize::try_from(self.limit).unwrap_or(0);
        items.skip(skip).take(take).collect()
    }
}
