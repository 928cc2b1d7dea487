use thiserror::Error;

use super::validation::ValidationError;
use crate::core_types::AccountId;
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("Owner '{owner}' already has a {currency} account")]
    Duplicate { owner: String, currency: String },

    #[error("Write conflict, please retry")]
    Conflict,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccountError {
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::Validation(_) => "INVALID_REQUEST",
            AccountError::NotFound(_) => "ACCOUNT_NOT_FOUND",
            AccountError::Duplicate { .. } => "DUPLICATE_ACCOUNT",
            AccountError::Conflict => "CONFLICT",
            AccountError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => AccountError::NotFound(id),
            StoreError::DuplicateAccount { owner, currency } => {
                AccountError::Duplicate { owner, currency }
            }
            StoreError::Conflict => AccountError::Conflict,
            StoreError::Internal(msg) => AccountError::Internal(msg),
        }
    }
}
