//! Lock lifecycle: NoLock → Active → (Expired) → NoLock.
//!
//! Every operation validates fully before touching state, then catches the
//! global checkpoint up to `now`, swaps the lock's old curve for its new one,
//! and writes the ledger. A rejected call leaves `VeState` untouched.

use tracing::info;
use velock_core::config::{CreatePolicy, EngineConfig};
use velock_core::curve::PowerCurve;
use velock_core::error::VelockError;
use velock_core::types::{AccountId, Balance, Lock, LockInfo, Power, Timestamp};

use crate::checkpoint::GlobalCheckpoint;
use crate::ledger::LockLedger;

/// The mutable context every lifecycle operation runs against.
#[derive(Clone, Debug)]
pub struct VeState {
    pub ledger: LockLedger,
    pub checkpoint: GlobalCheckpoint,
}

impl VeState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ledger: LockLedger::new(),
            checkpoint: GlobalCheckpoint::new(config),
        }
    }
}

/// Stateless lifecycle rules. All state lives in the `VeState` passed in.
#[derive(Clone, Debug)]
pub struct LockManager {
    curve: PowerCurve,
    policy: CreatePolicy,
}

impl LockManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            curve: PowerCurve::new(config),
            policy: config.create_policy,
        }
    }

    pub fn curve(&self) -> &PowerCurve {
        &self.curve
    }

    pub fn policy(&self) -> CreatePolicy {
        self.policy
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Lock `amount` for `duration_secs`, rounding the unlock time down to an
    /// epoch boundary.
    ///
    /// With an active lock on record the outcome depends on the create
    /// policy: `RejectIfActive` fails with `LockAlreadyExists`, `Merge` adds
    /// the amount and keeps the later of the two unlock times. An expired
    /// lock that has not been withdrawn fails with `LockExpired` either way.
    pub fn create_lock(
        &self,
        state: &mut VeState,
        owner: &AccountId,
        amount: Balance,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        self.curve.check_amount(amount)?;
        let unlock_time = self.curve.unlock_time_for(now, duration_secs)?;
        state.checkpoint.check_timestamp(now)?;

        let old = state.ledger.get(owner).cloned();
        let new = match &old {
            None => Lock {
                owner: owner.clone(),
                amount,
                unlock_time,
                created_at: now,
            },
            Some(existing) if existing.is_expired(now) => {
                return Err(VelockError::LockExpired { unlock_time: existing.unlock_time });
            }
            Some(existing) => match self.policy {
                CreatePolicy::RejectIfActive => {
                    return Err(VelockError::LockAlreadyExists(owner.to_string()));
                }
                CreatePolicy::Merge => {
                    let total = self.grown_amount(existing, amount)?;
                    let unlock_time = existing.unlock_time.max(unlock_time);
                    self.check_span(existing, unlock_time)?;
                    Lock { amount: total, unlock_time, ..existing.clone() }
                }
            },
        };

        self.commit(state, old.as_ref(), new.clone(), now)?;
        info!(
            owner = %owner,
            amount = new.amount,
            unlock_time = new.unlock_time,
            merged = old.is_some(),
            "lock created"
        );
        Ok(new)
    }

    /// Add `extra` to an active lock. The unlock time is unchanged.
    pub fn increase_amount(
        &self,
        state: &mut VeState,
        owner: &AccountId,
        extra: Balance,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        if extra == 0 {
            return Err(VelockError::ZeroAmount);
        }
        let old = self.active_lock(state, owner, now)?;
        let new = Lock { amount: self.grown_amount(&old, extra)?, ..old.clone() };

        self.commit(state, Some(&old), new.clone(), now)?;
        info!(owner = %owner, extra, amount = new.amount, "lock amount increased");
        Ok(new)
    }

    /// Push an active lock's unlock time out to `new_unlock_time` (rounded
    /// down to an epoch). The amount is unchanged.
    pub fn extend_lock(
        &self,
        state: &mut VeState,
        owner: &AccountId,
        new_unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        let old = self.active_lock(state, owner, now)?;
        let unlock_time = self.curve.round_to_epoch(new_unlock_time);
        if unlock_time <= old.unlock_time {
            return Err(VelockError::ShorteningNotAllowed {
                current: old.unlock_time,
                requested: unlock_time,
            });
        }
        self.check_span(&old, unlock_time)?;
        let new = Lock { unlock_time, ..old.clone() };

        self.commit(state, Some(&old), new.clone(), now)?;
        info!(
            owner = %owner,
            from = old.unlock_time,
            to = new.unlock_time,
            "lock extended"
        );
        Ok(new)
    }

    /// `extend_lock` with the target given as a duration from `now`.
    pub fn extend_lock_duration(
        &self,
        state: &mut VeState,
        owner: &AccountId,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        self.curve.check_duration(duration_secs)?;
        self.extend_lock(state, owner, now.saturating_add(duration_secs), now)
    }

    /// Release an expired lock, returning the record so the caller can pay
    /// out the principal.
    ///
    /// The lock's slope was already scheduled to leave the aggregate at its
    /// unlock epoch, so only the ledger entry changes.
    pub fn withdraw(
        &self,
        state: &mut VeState,
        owner: &AccountId,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        let lock = state
            .ledger
            .get(owner)
            .cloned()
            .ok_or_else(|| VelockError::LockNotFound(owner.to_string()))?;
        if !lock.is_expired(now) {
            return Err(VelockError::LockNotExpired { unlock_time: lock.unlock_time });
        }

        state.checkpoint.advance(now)?;
        state.ledger.clear(owner);
        info!(owner = %owner, amount = lock.amount, "lock withdrawn");
        Ok(lock)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn lock_info(&self, state: &VeState, owner: &AccountId) -> Option<LockInfo> {
        state.ledger.get(owner).map(Lock::info)
    }

    /// Owner's current power; zero with no lock or an expired one.
    pub fn voting_power(&self, state: &VeState, owner: &AccountId, now: Timestamp) -> Power {
        state
            .ledger
            .get(owner)
            .map(|lock| self.curve.lock_power(lock, now))
            .unwrap_or(0)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn active_lock(
        &self,
        state: &VeState,
        owner: &AccountId,
        now: Timestamp,
    ) -> Result<Lock, VelockError> {
        state.checkpoint.check_timestamp(now)?;
        let lock = state
            .ledger
            .get(owner)
            .cloned()
            .ok_or_else(|| VelockError::LockNotFound(owner.to_string()))?;
        if lock.is_expired(now) {
            return Err(VelockError::LockExpired { unlock_time: lock.unlock_time });
        }
        Ok(lock)
    }

    fn grown_amount(&self, lock: &Lock, extra: Balance) -> Result<Balance, VelockError> {
        let total = lock.amount.saturating_add(extra);
        self.curve.check_amount(total)?;
        Ok(total)
    }

    /// A lock may never span more than the maximum duration from creation.
    fn check_span(&self, lock: &Lock, unlock_time: Timestamp) -> Result<(), VelockError> {
        let span = unlock_time - lock.created_at;
        if span > self.curve.max_lock_secs() {
            return Err(self.curve.invalid_duration(span));
        }
        Ok(())
    }

    fn commit(
        &self,
        state: &mut VeState,
        old: Option<&Lock>,
        new: Lock,
        now: Timestamp,
    ) -> Result<(), VelockError> {
        let mut staged = state.checkpoint.clone();
        staged.advance(now)?;
        staged.apply_delta(old, Some(&new), now)?;
        state.checkpoint = staged;
        let owner = new.owner.clone();
        state.ledger.put(&owner, new);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velock_core::constants::{EPOCH_SECS, MAX_LOCK_SECS, UNITS_PER_TOKEN, YEAR_SECS};

    const NOW: Timestamp = 2_500 * EPOCH_SECS;

    fn setup(policy: CreatePolicy) -> (LockManager, VeState) {
        let config = EngineConfig { create_policy: policy, ..EngineConfig::default() };
        (LockManager::new(&config), VeState::new(&config))
    }

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn snapshot(state: &VeState) -> (Option<Lock>, velock_core::types::GlobalPoint, usize) {
        (
            state.ledger.get(&alice()).cloned(),
            state.checkpoint.point(),
            state.checkpoint.slope_changes().len(),
        )
    }

    // ── Create ────────────────────────────────────────────────────────────────

    #[test]
    fn create_records_lock_and_supply() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        let lock = m.create_lock(&mut s, &alice(), 1_000 * UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        assert_eq!(lock.unlock_time, NOW + YEAR_SECS);
        assert_eq!(lock.created_at, NOW);
        assert_eq!(
            s.checkpoint.total_supply_at(NOW).unwrap(),
            m.voting_power(&s, &alice(), NOW)
        );
        assert_eq!(m.lock_info(&s, &alice()).unwrap().amount, 1_000 * UNITS_PER_TOKEN);
    }

    #[test]
    fn create_zero_amount_rejected() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        assert_eq!(
            m.create_lock(&mut s, &alice(), 0, YEAR_SECS, NOW),
            Err(VelockError::ZeroAmount)
        );
        assert!(s.ledger.is_empty());
    }

    #[test]
    fn create_bad_duration_rejected() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        for duration in [0, EPOCH_SECS - 1, MAX_LOCK_SECS + 1] {
            assert!(matches!(
                m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, duration, NOW),
                Err(VelockError::InvalidDuration { .. })
            ));
        }
        assert!(s.ledger.is_empty());
    }

    #[test]
    fn create_twice_rejected_under_default_policy() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        let before = snapshot(&s);
        let err = m
            .create_lock(&mut s, &alice(), UNITS_PER_TOKEN, 2 * YEAR_SECS, NOW + 1)
            .unwrap_err();
        assert!(matches!(err, VelockError::LockAlreadyExists(_)));
        assert_eq!(snapshot(&s), before, "rejected create must not mutate state");
    }

    #[test]
    fn create_merges_under_merge_policy() {
        let (m, mut s) = setup(CreatePolicy::Merge);
        m.create_lock(&mut s, &alice(), 100 * UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        let merged = m
            .create_lock(&mut s, &alice(), 50 * UNITS_PER_TOKEN, 2 * YEAR_SECS, NOW + EPOCH_SECS)
            .unwrap();
        assert_eq!(merged.amount, 150 * UNITS_PER_TOKEN);
        assert_eq!(merged.unlock_time, NOW + EPOCH_SECS + 2 * YEAR_SECS);
        assert_eq!(merged.created_at, NOW);
        assert_eq!(
            s.checkpoint.total_supply_at(NOW + EPOCH_SECS).unwrap(),
            m.voting_power(&s, &alice(), NOW + EPOCH_SECS)
        );
    }

    #[test]
    fn merge_never_shortens() {
        let (m, mut s) = setup(CreatePolicy::Merge);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, 2 * YEAR_SECS, NOW).unwrap();
        let merged = m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, EPOCH_SECS, NOW).unwrap();
        assert_eq!(merged.unlock_time, NOW + 2 * YEAR_SECS);
        assert_eq!(merged.amount, 2 * UNITS_PER_TOKEN);
    }

    #[test]
    fn merge_cannot_exceed_span_from_creation() {
        let (m, mut s) = setup(CreatePolicy::Merge);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        let err = m
            .create_lock(&mut s, &alice(), UNITS_PER_TOKEN, MAX_LOCK_SECS, NOW + 10 * EPOCH_SECS)
            .unwrap_err();
        assert!(matches!(err, VelockError::InvalidDuration { .. }));
    }

    #[test]
    fn create_over_expired_lock_requires_withdraw() {
        for policy in [CreatePolicy::RejectIfActive, CreatePolicy::Merge] {
            let (m, mut s) = setup(policy);
            m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, EPOCH_SECS, NOW).unwrap();
            let later = NOW + 2 * EPOCH_SECS;
            assert_eq!(
                m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, later),
                Err(VelockError::LockExpired { unlock_time: NOW + EPOCH_SECS })
            );
            m.withdraw(&mut s, &alice(), later).unwrap();
            m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, later).unwrap();
        }
    }

    // ── Increase / extend ─────────────────────────────────────────────────────

    #[test]
    fn increase_without_lock_fails() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        assert!(matches!(
            m.increase_amount(&mut s, &alice(), 1, NOW),
            Err(VelockError::LockNotFound(_))
        ));
    }

    #[test]
    fn increase_zero_rejected() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        assert_eq!(m.increase_amount(&mut s, &alice(), 0, NOW), Err(VelockError::ZeroAmount));
    }

    #[test]
    fn increase_expired_rejected() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, EPOCH_SECS, NOW).unwrap();
        assert!(matches!(
            m.increase_amount(&mut s, &alice(), 1, NOW + EPOCH_SECS),
            Err(VelockError::LockExpired { .. })
        ));
    }

    #[test]
    fn increase_past_max_amount_rejected() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), velock_core::MAX_LOCK_AMOUNT, YEAR_SECS, NOW).unwrap();
        let before = snapshot(&s);
        assert!(matches!(
            m.increase_amount(&mut s, &alice(), 1, NOW),
            Err(VelockError::AmountTooLarge { .. })
        ));
        assert_eq!(snapshot(&s), before);
    }

    #[test]
    fn extend_must_lengthen() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        let before = snapshot(&s);
        assert_eq!(
            m.extend_lock(&mut s, &alice(), NOW + YEAR_SECS, NOW),
            Err(VelockError::ShorteningNotAllowed {
                current: NOW + YEAR_SECS,
                requested: NOW + YEAR_SECS,
            })
        );
        // Rounds down onto the current unlock epoch.
        assert!(matches!(
            m.extend_lock(&mut s, &alice(), NOW + YEAR_SECS + EPOCH_SECS - 1, NOW),
            Err(VelockError::ShorteningNotAllowed { .. })
        ));
        assert_eq!(snapshot(&s), before);
    }

    #[test]
    fn extend_beyond_span_from_creation_rejected() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        m.extend_lock(&mut s, &alice(), NOW + MAX_LOCK_SECS, NOW).unwrap();
        assert!(matches!(
            m.extend_lock(&mut s, &alice(), NOW + MAX_LOCK_SECS + EPOCH_SECS, NOW + EPOCH_SECS),
            Err(VelockError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn extend_by_duration_counts_from_now() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        let later = NOW + 4 * EPOCH_SECS;
        let lock = m.extend_lock_duration(&mut s, &alice(), 2 * YEAR_SECS, later).unwrap();
        assert_eq!(lock.unlock_time, later + 2 * YEAR_SECS);
        assert!(matches!(
            m.extend_lock_duration(&mut s, &alice(), MAX_LOCK_SECS + 1, later),
            Err(VelockError::InvalidDuration { .. })
        ));
    }

    // ── Withdraw ──────────────────────────────────────────────────────────────

    #[test]
    fn withdraw_lifecycle() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        assert!(matches!(
            m.withdraw(&mut s, &alice(), NOW),
            Err(VelockError::LockNotFound(_))
        ));
        m.create_lock(&mut s, &alice(), 7 * UNITS_PER_TOKEN, 2 * EPOCH_SECS, NOW).unwrap();
        assert_eq!(
            m.withdraw(&mut s, &alice(), NOW + EPOCH_SECS),
            Err(VelockError::LockNotExpired { unlock_time: NOW + 2 * EPOCH_SECS })
        );

        let released = m.withdraw(&mut s, &alice(), NOW + 2 * EPOCH_SECS).unwrap();
        assert_eq!(released.amount, 7 * UNITS_PER_TOKEN);
        assert!(m.lock_info(&s, &alice()).is_none());
        assert_eq!(m.voting_power(&s, &alice(), NOW + 2 * EPOCH_SECS), 0);
        assert_eq!(s.checkpoint.total_supply_at(NOW + 2 * EPOCH_SECS).unwrap(), 0);
    }

    #[test]
    fn stale_timestamp_rejected_before_mutation() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        m.create_lock(&mut s, &alice(), UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
        let bob = AccountId::from_label("bob");
        assert!(matches!(
            m.create_lock(&mut s, &bob, UNITS_PER_TOKEN, YEAR_SECS, NOW - 1),
            Err(VelockError::TimestampBeforeCheckpoint { .. })
        ));
        assert!(s.ledger.get(&bob).is_none());
    }

    #[test]
    fn supply_overflow_rejected_and_state_kept() {
        let (m, mut s) = setup(CreatePolicy::RejectIfActive);
        let amount = velock_core::MAX_LOCK_AMOUNT;
        let mut rejected = 0;
        for i in 0..50 {
            let owner = AccountId::from_label(&format!("whale-{i}"));
            let point = s.checkpoint.point();
            let locks = s.ledger.len();
            match m.create_lock(&mut s, &owner, amount, MAX_LOCK_SECS, NOW) {
                Ok(_) => {}
                Err(e) => {
                    assert_eq!(e, VelockError::SupplyOverflow);
                    assert_eq!(s.checkpoint.point(), point);
                    assert_eq!(s.ledger.len(), locks);
                    assert!(s.ledger.get(&owner).is_none());
                    rejected += 1;
                }
            }
            let summed: Power = s.ledger.iter().map(|l| m.curve().lock_power(l, NOW)).sum();
            assert_eq!(s.checkpoint.total_supply_at(NOW).unwrap(), summed);
        }
        assert!(rejected > 0);

        // Headroom below the limit is still usable.
        let minnow = AccountId::from_label("minnow");
        m.create_lock(&mut s, &minnow, UNITS_PER_TOKEN, MAX_LOCK_SECS, NOW).unwrap();
        let summed: Power = s.ledger.iter().map(|l| m.curve().lock_power(l, NOW)).sum();
        assert_eq!(s.checkpoint.total_supply_at(NOW).unwrap(), summed);
    }
}

