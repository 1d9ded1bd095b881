use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;
use velock_core::config::EngineConfig;
use velock_core::error::VelockError;
use velock_core::types::{AccountId, Balance, Lock, LockInfo, Power, Timestamp};

use crate::checkpoint::{Advance, GlobalCheckpoint};
use crate::db::{CommitBatch, StateDb, StoredCheckpoint};
use crate::ledger::LockLedger;
use crate::lifecycle::{LockManager, VeState};

/// Persisted vote-escrow engine.
///
/// Lifecycle calls are serialized behind a write lock and each commits its
/// ledger row, global point, and schedule changes in one storage
/// transaction. Queries take the read lock and always observe a fully
/// committed state.
pub struct VeEngine {
    pub db: Arc<StateDb>,
    manager: LockManager,
    state: RwLock<VeState>,
}

impl VeEngine {
    /// Load engine state from `db`.
    ///
    /// The first open records the curve parameters; later opens must use the
    /// same curve because stored slopes depend on it.
    pub fn open(db: Arc<StateDb>, config: EngineConfig) -> Result<Self, VelockError> {
        config.validate()?;
        match db.get_config()? {
            Some(stored) if !stored.same_curve(&config) => {
                return Err(VelockError::ConfigMismatch(format!(
                    "stored epoch={} min_lock={} max_lock={} boost={}, \
                     requested epoch={} min_lock={} max_lock={} boost={}",
                    stored.epoch_secs,
                    stored.min_lock_secs,
                    stored.max_lock_secs,
                    stored.max_boost,
                    config.epoch_secs,
                    config.min_lock_secs,
                    config.max_lock_secs,
                    config.max_boost
                )));
            }
            _ => db.put_config(&config)?,
        }

        let stored = db.get_checkpoint()?.unwrap_or_default();
        let ledger = LockLedger::from_locks(db.iter_locks()?);
        let checkpoint = GlobalCheckpoint::from_parts(
            &config,
            stored.point,
            stored.last_update,
            db.iter_slope_changes()?,
        );
        info!(
            locks = ledger.len(),
            checkpoint = stored.point.timestamp,
            "vote-escrow state loaded"
        );

        Ok(Self {
            db,
            manager: LockManager::new(&config),
            state: RwLock::new(VeState { ledger, checkpoint }),
        })
    }

    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn create_lock(
        &self,
        owner: &AccountId,
        amount: Balance,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        self.mutate(Some(owner), |m, s| m.create_lock(s, owner, amount, duration_secs, now))
    }

    pub fn increase_amount(
        &self,
        owner: &AccountId,
        extra: Balance,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        self.mutate(Some(owner), |m, s| m.increase_amount(s, owner, extra, now))
    }

    pub fn extend_lock(
        &self,
        owner: &AccountId,
        new_unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        self.mutate(Some(owner), |m, s| m.extend_lock(s, owner, new_unlock_time, now))
    }

    pub fn extend_lock_duration(
        &self,
        owner: &AccountId,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        self.mutate(Some(owner), |m, s| m.extend_lock_duration(s, owner, duration_secs, now))
    }

    pub fn withdraw(&self, owner: &AccountId, now: Timestamp) -> Result<Lock, VelockError> {
        self.mutate(Some(owner), |m, s| m.withdraw(s, owner, now))
    }

    /// Commit checkpoint catch-up to `now` without any lock change.
    pub fn checkpoint(&self, now: Timestamp) -> Result<Advance, VelockError> {
        self.mutate(None, |_, s| s.checkpoint.advance(now))
    }

    /// Total supply at `now`, committing the catch-up as a side effect.
    pub fn total_supply(&self, now: Timestamp) -> Result<Power, VelockError> {
        self.mutate(None, |_, s| s.checkpoint.total_supply(now))
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Total supply at `ts` from the committed state, without writing.
    pub fn total_supply_at(&self, ts: Timestamp) -> Result<Power, VelockError> {
        self.read().checkpoint.total_supply_at(ts)
    }

    pub fn voting_power(&self, owner: &AccountId, now: Timestamp) -> Power {
        self.manager.voting_power(&self.read(), owner, now)
    }

    pub fn lock_info(&self, owner: &AccountId) -> Option<LockInfo> {
        self.manager.lock_info(&self.read(), owner)
    }

    pub fn lock_count(&self) -> usize {
        self.read().ledger.len()
    }

    /// Aggregate supply and the sum of individual lock powers at `ts`, read
    /// from one snapshot. Linear in the number of locks; meant for audits.
    pub fn audit(&self, ts: Timestamp) -> Result<(Power, Power), VelockError> {
        let state = self.read();
        let aggregate = state.checkpoint.total_supply_at(ts)?;
        let summed = state
            .ledger
            .iter()
            .map(|lock| self.manager.curve().lock_power(lock, ts))
            .try_fold(0 as Power, |acc, p| acc.checked_add(p))
            .ok_or(VelockError::SupplyOverflow)?;
        Ok((aggregate, summed))
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, VeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against the live state and persist what it changed.
    ///
    /// `op` either fails without mutating or succeeds fully. If the storage
    /// commit fails, the in-memory state is restored before returning.
    fn mutate<T>(
        &self,
        owner: Option<&AccountId>,
        op: impl FnOnce(&LockManager, &mut VeState) -> Result<T, VelockError>,
    ) -> Result<T, VelockError> {
        let mut state = self.write();
        let checkpoint_before = state.checkpoint.clone();
        let lock_before = owner.and_then(|o| state.ledger.get(o).cloned());

        let out = op(&self.manager, &mut *state)?;

        let batch = CommitBatch {
            lock: owner.map(|o| (o.clone(), state.ledger.get(o).cloned())),
            checkpoint: StoredCheckpoint {
                point: state.checkpoint.point(),
                last_update: state.checkpoint.last_update(),
            },
            slope_changes: state.checkpoint.schedule_diff(&checkpoint_before),
        };
        if let Err(e) = self.db.commit(&batch) {
            state.checkpoint = checkpoint_before;
            if let Some(o) = owner {
                match lock_before {
                    Some(lock) => state.ledger.put(o, lock),
                    None => {
                        state.ledger.clear(o);
                    }
                }
            }
            return Err(e);
        }
        Ok(out)
    }
}
