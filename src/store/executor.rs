//! Atomic Execution Context
//!
//! Runs a closure against a fresh [`UnitOfWork`]: commit on `Ok`, rollback
//! on `Err`. A panic or a dropped future never reaches `commit`, so the
//! backend discards the uncommitted unit of work on drop.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::{Store, StoreError, UnitOfWork};

pub struct AtomicExecutor<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for AtomicExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> AtomicExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run `op` inside one transaction.
    ///
    /// Errors from `begin`/`commit` are converted with `E: From<StoreError>`,
    /// so a commit-time [`StoreError::Conflict`] reaches the caller as
    /// whatever `E` maps it to.
    ///
    /// ```ignore
    /// let account = executor
    ///     .run(|tx| async move { tx.get(1).await.map_err(AccountError::from) }.boxed())
    ///     .await?;
    /// ```
    pub async fn run<T, E, F>(&self, op: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        let mut tx = self.store.begin().await?;

        match op(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // The backend drops the transaction either way
                    warn!(error = %rollback_err, "Rollback failed");
                } else {
                    debug!("Unit of work rolled back");
                }
                Err(err)
            }
        }
    }
}
