//! Account store.
//!
//! Each account sits behind its own mutex. Mutation happens only through a
//! [`Locked`] set of accounts obtained by the ledger engine; the changes are
//! staged on copies and written back in one step once the journal has
//! accepted the matching records.

use crate::account::{Account, AccountId, AccountStatus, Counter};
use crate::decimal::Credits;
use crate::error::{LedgerError, Result};
use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Holds every account's current balance, lifetime totals and status.
pub struct AccountStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    next_id: AtomicU64,
    lock_timeout: Duration,
}

impl AccountStore {
    /// Creates an empty store. Lock attempts give up after `lock_timeout`.
    pub fn new(lock_timeout: Duration) -> Self {
        AccountStore {
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Opens a new zero-balance account and returns its id.
    pub fn open(&self, status: AccountStatus) -> AccountId {
        let id = AccountId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.accounts
            .write()
            .insert(id, Arc::new(Mutex::new(Account::new(id, status))));
        debug!("Opened account {} ({})", id, status);
        id
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.accounts.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent copy of one account.
    pub fn get(&self, id: AccountId) -> Result<Account> {
        let handle = self.handle(id)?;
        let guard = self.acquire(id, &handle)?;
        Ok(guard.clone())
    }

    pub fn balance(&self, id: AccountId) -> Result<Credits> {
        Ok(self.get(id)?.balance)
    }

    /// Changes an account's status. Status is not a balance mutation, so it
    /// does not go through the journal.
    pub fn set_status(&self, id: AccountId, status: AccountStatus) -> Result<()> {
        let handle = self.handle(id)?;
        let mut guard = self.acquire(id, &handle)?;
        guard.status = status;
        debug!("Account {} is now {}", id, status);
        Ok(())
    }

    /// Copies of all accounts, sorted by id.
    pub fn accounts(&self) -> Result<Vec<Account>> {
        let handles: Vec<_> = {
            let map = self.accounts.read();
            map.iter().map(|(id, h)| (*id, Arc::clone(h))).collect()
        };

        let mut out = Vec::with_capacity(handles.len());
        for (id, handle) in &handles {
            out.push(self.acquire(*id, handle)?.clone());
        }
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    /// Sum of all balances.
    pub fn total_balance(&self) -> Result<Credits> {
        Ok(self.accounts()?.iter().map(|a| a.balance).sum())
    }

    /// Resolves the handles for `ids`, sorted ascending and deduplicated.
    pub(crate) fn participants(&self, ids: &[AccountId]) -> Result<Participants> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let map = self.accounts.read();
        let mut handles = Vec::with_capacity(sorted.len());
        for id in sorted {
            let handle = map.get(&id).ok_or(LedgerError::AccountNotFound(id))?;
            handles.push((id, Arc::clone(handle)));
        }
        Ok(Participants {
            handles,
            timeout: self.lock_timeout,
        })
    }

    fn handle(&self, id: AccountId) -> Result<Arc<Mutex<Account>>> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    fn acquire<'a>(
        &self,
        id: AccountId,
        handle: &'a Mutex<Account>,
    ) -> Result<MutexGuard<'a, Account>> {
        lock_with_timeout(id, handle, self.lock_timeout)
    }
}

fn lock_with_timeout(
    id: AccountId,
    handle: &Mutex<Account>,
    timeout: Duration,
) -> Result<MutexGuard<'_, Account>> {
    handle.try_lock_for(timeout).ok_or_else(|| {
        warn!("Timed out after {:?} waiting for account {}", timeout, id);
        LedgerError::StorageFailure(format!("timed out waiting for account {}", id))
    })
}

/// The accounts taking part in one ledger operation, in lock order.
pub(crate) struct Participants {
    handles: Vec<(AccountId, Arc<Mutex<Account>>)>,
    timeout: Duration,
}

impl Participants {
    /// Locks every participant in ascending id order. Either all locks are
    /// taken or none are held on return.
    pub(crate) fn lock(&self) -> Result<Locked<'_>> {
        let mut guards = Vec::with_capacity(self.handles.len());
        for (id, handle) in &self.handles {
            guards.push((*id, lock_with_timeout(*id, handle, self.timeout)?));
        }
        Ok(Locked { guards })
    }
}

/// Exclusive access to a set of accounts for the duration of one operation.
pub(crate) struct Locked<'a> {
    guards: Vec<(AccountId, MutexGuard<'a, Account>)>,
}

impl<'a> Locked<'a> {
    pub(crate) fn account(&self, id: AccountId) -> Result<&Account> {
        self.guards
            .iter()
            .find(|(gid, _)| *gid == id)
            .map(|(_, g)| &**g)
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Copies the locked accounts so changes can be staged.
    pub(crate) fn stage(&self) -> Staged {
        Staged {
            accounts: self.guards.iter().map(|(_, g)| (**g).clone()).collect(),
        }
    }

    /// Writes staged account states back. Infallible: by the time this runs
    /// the journal has already accepted the records.
    pub(crate) fn commit(&mut self, staged: Staged) {
        for account in staged.accounts {
            if let Some((_, guard)) = self.guards.iter_mut().find(|(id, _)| *id == account.id) {
                **guard = account;
            }
        }
    }
}

/// Working copies of locked accounts.
pub(crate) struct Staged {
    accounts: Vec<Account>,
}

impl Staged {
    /// The store's only balance mutation path. Returns `(before, after)`.
    pub(crate) fn adjust(
        &mut self,
        id: AccountId,
        delta: Credits,
        counter: Counter,
    ) -> Result<(Credits, Credits)> {
        let account = self
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        let before = account.balance;
        let after = account.adjust(delta, counter)?;
        Ok((before, after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AccountStore {
        AccountStore::new(Duration::from_millis(50))
    }

    #[test]
    fn test_open_assigns_increasing_ids() {
        let store = store();
        let a = store.open(AccountStatus::Active);
        let b = store.open(AccountStatus::Active);
        assert!(a < b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.balance(a).unwrap(), Credits::ZERO);
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let store = store();
        let err = store.balance(AccountId::new(42)).unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(id) if id == AccountId::new(42)));
    }

    #[test]
    fn test_participants_are_sorted_and_deduplicated() {
        let store = store();
        let a = store.open(AccountStatus::Active);
        let b = store.open(AccountStatus::Active);
        let participants = store.participants(&[b, a, b]).unwrap();
        let ids: Vec<_> = participants.handles.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_staged_changes_apply_only_on_commit() {
        let store = store();
        let a = store.open(AccountStatus::Active);
        let participants = store.participants(&[a]).unwrap();

        {
            let locked = participants.lock().unwrap();
            let mut staged = locked.stage();
            staged.adjust(a, Credits::whole(5), Counter::Earned).unwrap();
            // dropped without commit
        }
        assert_eq!(store.balance(a).unwrap(), Credits::ZERO);

        {
            let mut locked = participants.lock().unwrap();
            let mut staged = locked.stage();
            let (before, after) = staged.adjust(a, Credits::whole(5), Counter::Earned).unwrap();
            assert_eq!(before, Credits::ZERO);
            assert_eq!(after, Credits::whole(5));
            locked.commit(staged);
        }
        assert_eq!(store.balance(a).unwrap(), Credits::whole(5));
    }

    #[test]
    fn test_lock_timeout_surfaces_storage_failure() {
        let store = store();
        let a = store.open(AccountStatus::Active);
        let participants = store.participants(&[a]).unwrap();
        let _held = participants.lock().unwrap();

        let err = store.balance(a).unwrap_err();
        assert!(matches!(err, LedgerError::StorageFailure(_)));
    }

    #[test]
    fn test_set_status() {
        let store = store();
        let a = store.open(AccountStatus::Active);
        store.set_status(a, AccountStatus::Suspended).unwrap();
        assert_eq!(store.get(a).unwrap().status, AccountStatus::Suspended);
    }
}
