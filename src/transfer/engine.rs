//! Transfer Engine
//!
//! Executes one funds transfer as a single unit of work:
//!
//! ```text
//! validate ─▶ lock(min id) ─▶ lock(max id) ─▶ check currency/balance
//!          ─▶ debit ─▶ credit ─▶ 2 entries ─▶ transfer record ─▶ commit
//! ```
//!
//! Row locks are always taken in ascending account-id order, so two
//! transfers touching the same pair of accounts can never wait on each
//! other in a cycle. A conflict reported by the store aborts the unit of
//! work and the whole transfer is retried under [`RetryPolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::retry::RetryPolicy;
use super::types::{TransferRequest, TransferResult};
use crate::account::{Account, Currency};
use crate::config::AppConfig;
use crate::core_types::{AccountId, MinorUnits};
use crate::store::{AccountRepository, AtomicExecutor, EntryLedger, Store, TransferLog};

/// Order in which a pair of account rows is locked
#[inline]
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Reject malformed requests before any storage access
fn validate(request: &TransferRequest) -> Result<Currency, TransferError> {
    if request.from_account_id < 1 || request.to_account_id < 1 {
        return Err(TransferError::InvalidRequest(
            "account ids must be positive".to_string(),
        ));
    }
    if request.from_account_id == request.to_account_id {
        return Err(TransferError::InvalidRequest(
            "source and destination accounts must differ".to_string(),
        ));
    }
    if request.amount <= 0 {
        return Err(TransferError::InvalidRequest(format!(
            "amount must be positive, got {}",
            request.amount
        )));
    }
    Ok(Currency::new(&request.currency)?)
}

fn ensure_currency(account: &Account, currency: &Currency) -> Result<(), TransferError> {
    if &account.currency != currency {
        return Err(TransferError::CurrencyMismatch {
            account_id: account.id,
            expected: currency.clone(),
            actual: account.currency.clone(),
        });
    }
    Ok(())
}

/// Body of one transfer attempt. Any error leaves the unit of work to be
/// rolled back by the caller.
async fn transfer_in<U>(
    tx: &mut U,
    from: AccountId,
    to: AccountId,
    amount: MinorUnits,
    currency: Currency,
) -> Result<TransferResult, TransferError>
where
    U: AccountRepository + EntryLedger + TransferLog,
{
    let (first, second) = lock_order(from, to);
    debug!(first, second, "Locking account rows");
    let first_account = tx.get_for_update(first).await?;
    let second_account = tx.get_for_update(second).await?;

    let (source, destination) = if first == from {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    ensure_currency(&source, &currency)?;
    ensure_currency(&destination, &currency)?;

    if !source.can_cover(amount) {
        return Err(TransferError::InsufficientFunds {
            account_id: from,
            available: source.balance,
            requested: amount,
        });
    }
    if destination.balance.checked_add(amount).is_none() {
        return Err(TransferError::InvalidRequest(format!(
            "credit would overflow balance of account {}",
            to
        )));
    }

    let from_account = tx.add_balance(from, -amount).await?;
    let to_account = tx.add_balance(to, amount).await?;
    let from_entry = tx.append_entry(from, -amount).await?;
    let to_entry = tx.append_entry(to, amount).await?;
    let transfer = tx.append_transfer(from, to, amount).await?;

    Ok(TransferResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}

pub struct TransferEngine<S: Store> {
    executor: AtomicExecutor<S>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl<S: Store> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            retry: self.retry,
            timeout: self.timeout,
        }
    }
}

impl<S: Store> TransferEngine<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            executor: AtomicExecutor::new(store),
            retry,
            timeout: None,
        }
    }

    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, RetryPolicy::default())
    }

    pub fn from_config(store: Arc<S>, config: &AppConfig) -> Self {
        let engine = Self::new(store, RetryPolicy::from_config(&config.retry));
        match config.transfer_timeout() {
            Some(timeout) => engine.with_timeout(timeout),
            None => engine,
        }
    }

    /// Bound every `execute` call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn store(&self) -> &Arc<S> {
        self.executor.store()
    }

    /// Move `amount` from `from_account_id` to `to_account_id`.
    ///
    /// On success both balances, both entries and the transfer record are
    /// committed together; on any error none of them are.
    pub async fn execute(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferResult, TransferError> {
        match self.timeout {
            Some(timeout) => {
                self.execute_with_deadline(request, Instant::now() + timeout)
                    .await
            }
            None => self.execute_with_retry(request).await,
        }
    }

    /// Like [`execute`](Self::execute) but gives up at `deadline`.
    ///
    /// The in-flight unit of work is dropped, which rolls it back and
    /// releases its row locks.
    pub async fn execute_with_deadline(
        &self,
        request: &TransferRequest,
        deadline: Instant,
    ) -> Result<TransferResult, TransferError> {
        match tokio::time::timeout_at(deadline, self.execute_with_retry(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    from = request.from_account_id,
                    to = request.to_account_id,
                    amount = request.amount,
                    "Transfer deadline exceeded, rolled back"
                );
                Err(TransferError::DeadlineExceeded)
            }
        }
    }

    /// Like [`execute`](Self::execute) but aborts as soon as `cancel` resolves
    pub async fn execute_until<C>(
        &self,
        request: &TransferRequest,
        cancel: C,
    ) -> Result<TransferResult, TransferError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            result = self.execute(request) => result,
            _ = cancel => {
                debug!(
                    from = request.from_account_id,
                    to = request.to_account_id,
                    "Transfer cancelled, rolled back"
                );
                Err(TransferError::Cancelled)
            }
        }
    }

    async fn execute_with_retry(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferResult, TransferError> {
        let currency = validate(request)?;
        let (from, to, amount) = (
            request.from_account_id,
            request.to_account_id,
            request.amount,
        );

        let mut attempt: u32 = 1;
        loop {
            let currency = currency.clone();
            let outcome = self
                .executor
                .run(move |tx| transfer_in(tx, from, to, amount, currency).boxed())
                .await;

            match outcome {
                Ok(result) => {
                    info!(
                        transfer_id = result.transfer.id,
                        from,
                        to,
                        amount,
                        attempt,
                        "Transfer committed"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        from,
                        to,
                        amount,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transfer conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(from, to, amount, attempt, "Transfer conflict, retries exhausted");
                    return Err(TransferError::Conflict { attempts: attempt });
                }
                Err(e) => {
                    debug!(from, to, amount, attempt, error = %e, "Transfer rejected");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn request(from: AccountId, to: AccountId, amount: MinorUnits) -> TransferRequest {
        TransferRequest::new(from, to, amount, "USD")
    }

    #[test]
    fn test_lock_order_is_ascending() {
        assert_eq!(lock_order(7, 3), (3, 7));
        assert_eq!(lock_order(3, 7), (3, 7));
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(matches!(
            validate(&request(1, 1, 10)),
            Err(TransferError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate(&request(1, 2, 0)),
            Err(TransferError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate(&request(1, 2, -5)),
            Err(TransferError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate(&request(0, 2, 5)),
            Err(TransferError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate(&TransferRequest::new(1, 2, 5, "usd")),
            Err(TransferError::InvalidRequest(_))
        ));
        assert_eq!(validate(&request(1, 2, 5)), Ok(Currency::usd()));
    }

    #[tokio::test]
    async fn test_invalid_request_never_opens_unit_of_work() {
        let store = Arc::new(MemoryStore::new());
        let engine = TransferEngine::with_defaults(store.clone());

        let err = engine.execute(&request(1, 1, 10)).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
        assert_eq!(store.begin_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_account() {
        let store = Arc::new(MemoryStore::new());
        let engine = TransferEngine::with_defaults(store.clone());

        let err = engine.execute(&request(1, 2, 10)).await.unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound(1));
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_from_config_applies_timeout() {
        let config = AppConfig::from_yaml(
            "log_level: info\nlog_dir: ./logs\nlog_file: t.log\nuse_json: false\nrotation: never\ntransfer_timeout_ms: 50\nretry:\n  max_attempts: 2\n  base_backoff_ms: 1\n  max_backoff_ms: 2\n",
        )
        .unwrap();
        let engine = TransferEngine::from_config(Arc::new(MemoryStore::new()), &config);
        assert_eq!(engine.timeout, Some(Duration::from_millis(50)));
        assert_eq!(engine.retry_policy().max_attempts, 2);
    }
}
