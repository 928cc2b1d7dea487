//! Read-side access to the ledger: transfers, entries and reconciliation.

use std::sync::Arc;

use futures::FutureExt;

use super::error::TransferError;
use super::retry::RetryPolicy;
use super::types::{Entry, Reconciliation, Transfer};
use crate::account::Page;
use crate::core_types::{AccountId, TransferId};
use crate::store::{AccountRepository, AtomicExecutor, EntryLedger, Store, TransferLog};

pub struct LedgerReader<S: Store> {
    executor: AtomicExecutor<S>,
    retry: RetryPolicy,
}

impl<S: Store> Clone for LedgerReader<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            retry: self.retry,
        }
    }
}

impl<S: Store> LedgerReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    /// Retry budget for `reconcile`, the only read that takes a row lock
    pub fn with_retry(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            executor: AtomicExecutor::new(store),
            retry,
        }
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.executor
            .run(move |tx| {
                async move {
                    tx.get_transfer(id)
                        .await?
                        .ok_or(TransferError::TransferNotFound(id))
                }
                .boxed()
            })
            .await
    }

    /// Transfers sent by `from_account_id` or received by `to_account_id`,
    /// oldest first
    pub async fn list_transfers(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        page_id: i32,
        page_size: i32,
    ) -> Result<Vec<Transfer>, TransferError> {
        let page = Page::new(page_id, page_size)?;
        self.executor
            .run(move |tx| {
                async move {
                    Ok::<_, TransferError>(
                        tx.list_transfers(from_account_id, to_account_id, page)
                            .await?,
                    )
                }
                .boxed()
            })
            .await
    }

    pub async fn list_entries(
        &self,
        account_id: AccountId,
        page_id: i32,
        page_size: i32,
    ) -> Result<Vec<Entry>, TransferError> {
        let page = Page::new(page_id, page_size)?;
        self.executor
            .run(move |tx| {
                async move {
                    tx.get(account_id).await?;
                    Ok::<_, TransferError>(tx.list_entries(account_id, page).await?)
                }
                .boxed()
            })
            .await
    }

    /// Compare the stored balance with the sum of the account's entries.
    ///
    /// The row is locked first so no transfer can land between the two reads.
    /// Waiting on a transfer that holds the row can end in a conflict; the
    /// read is retried under the reader's [`RetryPolicy`].
    pub async fn reconcile(&self, account_id: AccountId) -> Result<Reconciliation, TransferError> {
        self.retry
            .retry(|| self.reconcile_once(account_id))
            .await
    }

    async fn reconcile_once(&self, account_id: AccountId) -> Result<Reconciliation, TransferError> {
        self.executor
            .run(move |tx| {
                async move {
                    let account = tx.get_for_update(account_id).await?;
                    let entry_sum = tx.entry_sum(account_id).await?;
                    Ok::<_, TransferError>(Reconciliation::new(
                        account_id,
                        account.balance,
                        entry_sum,
                    ))
                }
                .boxed()
            })
            .await
    }
}
