//! Account lifecycle on top of the ledger store
//!
//! New accounts open with a zero balance. `open_funded_account` writes the
//! opening deposit as an entry in the same unit of work, so the account
//! reconciles from its first moment.

use std::sync::Arc;

use futures::FutureExt;
use tracing::info;

use super::error::AccountError;
use super::models::Account;
use super::validation::{Currency, Page, ValidationError, validate_owner};
use crate::core_types::{AccountId, MinorUnits};
use crate::store::{AccountRepository, AtomicExecutor, EntryLedger, Store};

pub struct AccountService<S: Store> {
    executor: AtomicExecutor<S>,
}

impl<S: Store> Clone for AccountService<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<S: Store> AccountService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            executor: AtomicExecutor::new(store),
        }
    }

    pub async fn create_account(
        &self,
        owner: &str,
        currency: &str,
    ) -> Result<Account, AccountError> {
        self.open_funded_account(owner, currency, 0).await
    }

    pub async fn open_funded_account(
        &self,
        owner: &str,
        currency: &str,
        initial_deposit: MinorUnits,
    ) -> Result<Account, AccountError> {
        validate_owner(owner)?;
        let currency = Currency::new(currency)?;
        currency.ensure_supported()?;
        if initial_deposit < 0 {
            return Err(ValidationError::InvalidFormat {
                field: "initial_deposit",
                value: initial_deposit.to_string(),
                expected: "a non-negative amount",
            }
            .into());
        }

        let owner = owner.to_string();
        let account = self
            .executor
            .run(move |tx| {
                async move {
                    let account = tx.create_account(&owner, &currency, 0).await?;
                    if initial_deposit == 0 {
                        return Ok::<_, AccountError>(account);
                    }
                    let account = tx.add_balance(account.id, initial_deposit).await?;
                    tx.append_entry(account.id, initial_deposit).await?;
                    Ok(account)
                }
                .boxed()
            })
            .await?;

        info!(
            account_id = account.id,
            owner = %account.owner,
            currency = %account.currency,
            balance = account.balance,
            "Account opened"
        );
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AccountError> {
        self.executor
            .run(move |tx| async move { Ok::<_, AccountError>(tx.get(id).await?) }.boxed())
            .await
    }

    /// One page of `owner`'s accounts, ordered by id
    pub async fn list_accounts(
        &self,
        owner: &str,
        page_id: i32,
        page_size: i32,
    ) -> Result<Vec<Account>, AccountError> {
        let page = Page::new(page_id, page_size)?;
        let owner = owner.to_string();
        self.executor
            .run(move |tx| {
                async move { Ok::<_, AccountError>(tx.list_by_owner(&owner, page).await?) }.boxed()
            })
            .await
    }
}
