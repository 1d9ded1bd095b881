use std::collections::HashMap;

use velock_core::types::{AccountId, Lock};

/// Per-account lock records. At most one lock per owner.
///
/// Mutation goes through `&mut self`, so a ledger shared behind a `RwLock`
/// gives concurrent readers and a single writer.
#[derive(Clone, Debug, Default)]
pub struct LockLedger {
    locks: HashMap<AccountId, Lock>,
}

impl LockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted records.
    pub fn from_locks(locks: impl IntoIterator<Item = Lock>) -> Self {
        Self {
            locks: locks.into_iter().map(|l| (l.owner.clone(), l)).collect(),
        }
    }

    pub fn get(&self, owner: &AccountId) -> Option<&Lock> {
        self.locks.get(owner)
    }

    /// Insert or replace the lock held by `owner`.
    pub fn put(&mut self, owner: &AccountId, lock: Lock) {
        debug_assert_eq!(&lock.owner, owner);
        self.locks.insert(owner.clone(), lock);
    }

    /// Remove the owner's lock, returning it if one existed.
    pub fn clear(&mut self, owner: &AccountId) -> Option<Lock> {
        self.locks.remove(owner)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }
}
