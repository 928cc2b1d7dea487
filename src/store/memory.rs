//! In-process ledger storage
//!
//! Same contract as the PostgreSQL backend, kept in memory:
//! - `get_for_update` takes an exclusive async row lock held until the
//!   unit of work ends (the analogue of `SELECT ... FOR UPDATE`)
//! - writes are staged inside the unit of work and published in one step
//!   at commit, so other readers only ever see committed state
//! - dropping a unit of work without commit discards the staged writes
//!
//! Fault injection (`set_fail_point`, `inject_commit_conflicts`) and the
//! begin/commit counters exist for tests of the engine's failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::{AccountRepository, EntryLedger, Store, StoreError, TransferLog, UnitOfWork};
use crate::account::{Account, Currency, Page};
use crate::core_types::{AccountId, EntryId, MinorUnits, TransferId};
use crate::transfer::types::{Entry, Transfer};

/// Operation that fails with `StoreError::Internal` while set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    AddBalance,
    AppendEntry,
    AppendTransfer,
    Commit,
}

#[derive(Default)]
struct Committed {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

struct Shared {
    state: Mutex<Committed>,
    row_locks: DashMap<AccountId, Arc<tokio::sync::Mutex<()>>>,
    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,
    next_transfer_id: AtomicI64,
    fail_point: Mutex<Option<FailPoint>>,
    pending_conflicts: AtomicU32,
    begin_count: AtomicUsize,
    commit_count: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, Committed> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, id: AccountId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.row_locks.entry(id).or_default())
    }

    fn check_fail(&self, point: FailPoint) -> Result<(), StoreError> {
        let current = *self
            .fail_point
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if current == Some(point) {
            return Err(StoreError::Internal(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory ledger with PostgreSQL-like locking semantics
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Committed::default()),
                row_locks: DashMap::new(),
                next_account_id: AtomicI64::new(1),
                next_entry_id: AtomicI64::new(1),
                next_transfer_id: AtomicI64::new(1),
                fail_point: Mutex::new(None),
                pending_conflicts: AtomicU32::new(0),
                begin_count: AtomicUsize::new(0),
                commit_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_fail_point(&self, point: Option<FailPoint>) {
        *self
            .shared
            .fail_point
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = point;
    }

    /// Make the next `n` commits fail with `StoreError::Conflict`
    pub fn inject_commit_conflicts(&self, n: u32) {
        self.shared.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn begin_count(&self) -> usize {
        self.shared.begin_count.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.shared.commit_count.load(Ordering::SeqCst)
    }

    /// Committed state of one account
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.shared.state().accounts.get(&id).cloned()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.shared.state().accounts.values().cloned().collect()
    }

    pub fn entries_for(&self, account_id: AccountId) -> Vec<Entry> {
        self.shared
            .state()
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.shared.state().transfers.values().cloned().collect()
    }

    /// Sum of committed balances across all accounts
    pub fn total_balance(&self) -> i128 {
        self.shared
            .state()
            .accounts
            .values()
            .map(|a| a.balance as i128)
            .sum()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        self.shared.begin_count.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx {
            shared: self.shared.clone(),
            row_guards: HashMap::new(),
            accounts: BTreeMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
            finished: false,
        })
    }
}

/// Unit of work over [`MemoryStore`]
pub struct MemoryTx {
    shared: Arc<Shared>,
    row_guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    // Staged writes, published at commit
    accounts: BTreeMap<AccountId, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    finished: bool,
}

impl MemoryTx {
    /// Own staged state first, then committed state
    fn visible(&self, id: AccountId) -> Option<Account> {
        self.accounts
            .get(&id)
            .cloned()
            .or_else(|| self.shared.state().accounts.get(&id).cloned())
    }

    async fn lock_row(&mut self, id: AccountId) {
        if self.row_guards.contains_key(&id) {
            return;
        }
        let lock = self.shared.row_lock(id);
        let guard = lock.lock_owned().await;
        self.row_guards.insert(id, guard);
    }

    fn has_staged_writes(&self) -> bool {
        !(self.accounts.is_empty() && self.entries.is_empty() && self.transfers.is_empty())
    }

    fn discard(&mut self) {
        self.accounts.clear();
        self.entries.clear();
        self.transfers.clear();
        self.row_guards.clear();
        self.finished = true;
    }

    fn is_duplicate(&self, committed: &Committed, candidate: &Account) -> bool {
        committed
            .accounts
            .values()
            .chain(self.accounts.values())
            .any(|a| {
                a.id != candidate.id
                    && a.owner == candidate.owner
                    && a.currency == candidate.currency
            })
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished && self.has_staged_writes() {
            debug!(
                accounts = self.accounts.len(),
                entries = self.entries.len(),
                transfers = self.transfers.len(),
                "Discarding uncommitted unit of work"
            );
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryTx {
    async fn create_account(
        &mut self,
        owner: &str,
        currency: &Currency,
        balance: MinorUnits,
    ) -> Result<Account, StoreError> {
        let account = Account {
            id: self.shared.next_account_id.fetch_add(1, Ordering::SeqCst),
            owner: owner.to_string(),
            balance,
            currency: currency.clone(),
            created_at: Utc::now(),
        };

        let duplicate = {
            let committed = self.shared.state();
            self.is_duplicate(&committed, &account)
        };
        if duplicate {
            return Err(StoreError::DuplicateAccount {
                owner: owner.to_string(),
                currency: currency.to_string(),
            });
        }

        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.visible(id).ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        if self.visible(id).is_none() {
            return Err(StoreError::AccountNotFound(id));
        }
        self.lock_row(id).await;
        // Re-read: the previous lock holder may have committed a new balance
        self.visible(id).ok_or(StoreError::AccountNotFound(id))
    }

    async fn add_balance(
        &mut self,
        id: AccountId,
        delta: MinorUnits,
    ) -> Result<Account, StoreError> {
        self.shared.check_fail(FailPoint::AddBalance)?;
        if self.visible(id).is_none() {
            return Err(StoreError::AccountNotFound(id));
        }
        self.lock_row(id).await;

        let mut account = self.visible(id).ok_or(StoreError::AccountNotFound(id))?;
        account.balance = account.balance.checked_add(delta).ok_or_else(|| {
            StoreError::Internal(format!("balance overflow on account {}", id))
        })?;
        self.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn list_by_owner(
        &mut self,
        owner: &str,
        page: Page,
    ) -> Result<Vec<Account>, StoreError> {
        let mut merged: BTreeMap<AccountId, Account> = self
            .shared
            .state()
            .accounts
            .values()
            .filter(|a| a.owner == owner)
            .map(|a| (a.id, a.clone()))
            .collect();
        for account in self.accounts.values().filter(|a| a.owner == owner) {
            merged.insert(account.id, account.clone());
        }
        Ok(page.apply(merged.into_values()))
    }
}

#[async_trait]
impl EntryLedger for MemoryTx {
    async fn append_entry(
        &mut self,
        account_id: AccountId,
        amount: MinorUnits,
    ) -> Result<Entry, StoreError> {
        self.shared.check_fail(FailPoint::AppendEntry)?;
        if self.visible(account_id).is_none() {
            return Err(StoreError::AccountNotFound(account_id));
        }

        let entry = Entry {
            id: self.shared.next_entry_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>, StoreError> {
        if let Some(entry) = self.entries.iter().find(|e| e.id == id) {
            return Ok(Some(entry.clone()));
        }
        Ok(self.shared.state().entries.get(&id).cloned())
    }

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, StoreError> {
        let mut merged: Vec<Entry> = self
            .shared
            .state()
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        merged.extend(
            self.entries
                .iter()
                .filter(|e| e.account_id == account_id)
                .cloned(),
        );
        merged.sort_by_key(|e| e.id);
        Ok(page.apply(merged.into_iter()))
    }

    async fn entry_sum(&mut self, account_id: AccountId) -> Result<MinorUnits, StoreError> {
        let overflow = || StoreError::Internal(format!("entry sum overflow on account {}", account_id));
        let committed = self
            .shared
            .state()
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .try_fold(0 as MinorUnits, |acc, e| acc.checked_add(e.amount))
            .ok_or_else(overflow)?;
        self.entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .try_fold(committed, |acc, e| acc.checked_add(e.amount))
            .ok_or_else(overflow)
    }
}

#[async_trait]
impl TransferLog for MemoryTx {
    async fn append_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
    ) -> Result<Transfer, StoreError> {
        self.shared.check_fail(FailPoint::AppendTransfer)?;
        for id in [from_account_id, to_account_id] {
            if self.visible(id).is_none() {
                return Err(StoreError::AccountNotFound(id));
            }
        }

        let transfer = Transfer {
            id: self.shared.next_transfer_id.fetch_add(1, Ordering::SeqCst),
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        if let Some(transfer) = self.transfers.iter().find(|t| t.id == id) {
            return Ok(Some(transfer.clone()));
        }
        Ok(self.shared.state().transfers.get(&id).cloned())
    }

    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError> {
        let matches =
            |t: &&Transfer| t.from_account_id == from_account_id || t.to_account_id == to_account_id;

        let mut merged: Vec<Transfer> = self
            .shared
            .state()
            .transfers
            .values()
            .filter(matches)
            .cloned()
            .collect();
        merged.extend(self.transfers.iter().filter(matches).cloned());
        merged.sort_by_key(|t| t.id);
        Ok(page.apply(merged.into_iter()))
    }
}

#[async_trait]
impl UnitOfWork for MemoryTx {
    async fn commit(mut self) -> Result<(), StoreError> {
        if let Err(e) = self.shared.check_fail(FailPoint::Commit) {
            self.discard();
            return Err(e);
        }
        if self.shared.take_conflict() {
            self.discard();
            return Err(StoreError::Conflict);
        }

        {
            let mut committed = self.shared.state();

            // Unique (owner, currency) is enforced again here: two units of
            // work may have staged the same pair concurrently
            let duplicate = self
                .accounts
                .values()
                .find(|a| {
                    !committed.accounts.contains_key(&a.id) && self.is_duplicate(&committed, a)
                })
                .cloned();
            if let Some(dup) = duplicate {
                drop(committed);
                self.discard();
                return Err(StoreError::DuplicateAccount {
                    owner: dup.owner,
                    currency: dup.currency.to_string(),
                });
            }

            for (id, account) in std::mem::take(&mut self.accounts) {
                committed.accounts.insert(id, account);
            }
            for entry in std::mem::take(&mut self.entries) {
                committed.entries.insert(entry.id, entry);
            }
            for transfer in std::mem::take(&mut self.transfers) {
                committed.transfers.insert(transfer.id, transfer);
            }
        }

        self.finished = true;
        self.shared.commit_count.fetch_add(1, Ordering::SeqCst);
        // Row locks are released when `self` drops, after publication
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.discard();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn seeded(store: &MemoryStore, owner: &str, balance: MinorUnits) -> Account {
        let mut tx = store.begin().await.unwrap();
        let account = tx
            .create_account(owner, &Currency::usd(), balance)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let account = seeded(&store, "alice", 100).await;

        let mut tx = store.begin().await.unwrap();
        let updated = tx.add_balance(account.id, 50).await.unwrap();
        assert_eq!(updated.balance, 150);

        // Own writes are visible inside the unit of work only
        assert_eq!(tx.get(account.id).await.unwrap().balance, 150);
        assert_eq!(store.account(account.id).unwrap().balance, 100);

        tx.commit().await.unwrap();
        assert_eq!(store.account(account.id).unwrap().balance, 150);
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryStore::new();
        let account = seeded(&store, "alice", 100).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.add_balance(account.id, -100).await.unwrap();
            tx.append_entry(account.id, -100).await.unwrap();
        }

        assert_eq!(store.account(account.id).unwrap().balance, 100);
        assert!(store.entries_for(account.id).is_empty());
    }

    #[tokio::test]
    async fn test_add_balance_does_not_clamp() {
        let store = MemoryStore::new();
        let account = seeded(&store, "alice", 10).await;

        let mut tx = store.begin().await.unwrap();
        let updated = tx.add_balance(account.id, -25).await.unwrap();
        assert_eq!(updated.balance, -15);
    }

    #[tokio::test]
    async fn test_missing_account() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        assert_eq!(tx.get(9).await, Err(StoreError::AccountNotFound(9)));
        assert_eq!(
            tx.get_for_update(9).await,
            Err(StoreError::AccountNotFound(9))
        );
        assert_eq!(
            tx.add_balance(9, 1).await,
            Err(StoreError::AccountNotFound(9))
        );
        assert_eq!(
            tx.append_entry(9, 1).await,
            Err(StoreError::AccountNotFound(9))
        );
    }

    #[tokio::test]
    async fn test_append_transfer_checks_both_accounts() {
        let store = MemoryStore::new();
        let a = seeded(&store, "alice", 0).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.append_transfer(a.id, 77, 5).await,
            Err(StoreError::AccountNotFound(77))
        );
    }

    #[tokio::test]
    async fn test_duplicate_owner_currency() {
        let store = MemoryStore::new();
        seeded(&store, "alice", 0).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .create_account("alice", &Currency::usd(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAccount { .. }));

        // Same owner, other currency is fine
        assert!(tx.create_account("alice", &Currency::eur(), 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_rejected_at_commit() {
        let store = MemoryStore::new();

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        tx1.create_account("bob", &Currency::cad(), 0).await.unwrap();
        tx2.create_account("bob", &Currency::cad(), 0).await.unwrap();

        tx1.commit().await.unwrap();
        assert!(matches!(
            tx2.commit().await,
            Err(StoreError::DuplicateAccount { .. })
        ));
        assert_eq!(store.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_writer() {
        let store = MemoryStore::new();
        let account = seeded(&store, "alice", 100).await;

        let mut holder = store.begin().await.unwrap();
        holder.get_for_update(account.id).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let seen = tx.get_for_update(account.id).await.unwrap();
                tx.commit().await.unwrap();
                seen.balance
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        holder.add_balance(account.id, 1).await.unwrap();
        holder.commit().await.unwrap();

        // The waiter observes the balance committed by the previous holder
        assert_eq!(contender.await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_fail_point() {
        let store = MemoryStore::new();
        let account = seeded(&store, "alice", 0).await;
        store.set_fail_point(Some(FailPoint::AppendEntry));

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.append_entry(account.id, 1).await,
            Err(StoreError::Internal(_))
        ));

        store.set_fail_point(None);
        assert!(tx.append_entry(account.id, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryStore::new();
        store.inject_commit_conflicts(2);

        for _ in 0..2 {
            let tx = store.begin().await.unwrap();
            assert_eq!(tx.commit().await, Err(StoreError::Conflict));
        }
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
        assert_eq!(store.begin_count(), 3);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_list_and_sum() {
        let store = MemoryStore::new();
        let a = seeded(&store, "alice", 0).await;
        let b = seeded(&store, "bob", 0).await;

        let mut tx = store.begin().await.unwrap();
        tx.append_entry(a.id, 30).await.unwrap();
        tx.append_entry(a.id, -10).await.unwrap();
        tx.append_entry(b.id, 5).await.unwrap();
        tx.append_transfer(a.id, b.id, 10).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let staged = tx.append_entry(a.id, 1).await.unwrap();
        assert_eq!(tx.get_entry(staged.id).await.unwrap(), Some(staged));
        assert_eq!(tx.get_entry(9_999).await.unwrap(), None);
        assert_eq!(tx.entry_sum(a.id).await.unwrap(), 21);
        tx.append_entry(b.id, MinorUnits::MAX).await.unwrap();
        assert!(matches!(
            tx.entry_sum(b.id).await,
            Err(StoreError::Internal(_))
        ));
        assert_eq!(tx.list_entries(a.id, Page::all()).await.unwrap().len(), 3);
        assert_eq!(
            tx.list_transfers(b.id, b.id, Page::all()).await.unwrap().len(),
            1
        );
        assert_eq!(
            tx.list_by_owner("alice", Page::all()).await.unwrap(),
            vec![a]
        );
    }
}
