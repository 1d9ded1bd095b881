//! Linear-decay power curve.
//!
//! A lock of `amount` units that unlocks at `unlock_time` carries
//!
//!   power(now) = slope(amount) × (unlock_time − now)        for now < unlock_time
//!   power(now) = 0                                          otherwise
//!
//!   slope(amount) = ⌊amount × max_boost × POWER_PRECISION / max_lock_secs⌋
//!
//! Power is a whole-number line in `now`, so the sum of any set of lock curves
//! is itself exactly representable as one aggregate (bias, slope) pair.

use crate::config::EngineConfig;
use crate::constants::{MAX_LOCK_AMOUNT, POWER_PRECISION};
use crate::error::VelockError;
use crate::types::{Balance, Lock, Power, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerCurve {
    epoch_secs: i64,
    min_lock_secs: i64,
    max_lock_secs: i64,
    max_boost: u128,
}

impl Default for PowerCurve {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl PowerCurve {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            epoch_secs: config.epoch_secs,
            min_lock_secs: config.min_lock_secs,
            max_lock_secs: config.max_lock_secs,
            max_boost: config.max_boost,
        }
    }

    pub fn max_lock_secs(&self) -> i64 {
        self.max_lock_secs
    }

    /// Rate at which a lock of `amount` loses power, per second.
    pub fn slope(&self, amount: Balance) -> u128 {
        amount
            .saturating_mul(self.max_boost)
            .saturating_mul(POWER_PRECISION)
            / self.max_lock_secs as u128
    }

    /// `slope` in the signed form the aggregate curve accumulates.
    pub fn signed_slope(&self, amount: Balance) -> Result<i128, VelockError> {
        i128::try_from(self.slope(amount)).map_err(|_| VelockError::SupplyOverflow)
    }

    /// Instantaneous power of `(amount, unlock_time)` at `now`.
    pub fn power(&self, amount: Balance, unlock_time: Timestamp, now: Timestamp) -> Power {
        if now >= unlock_time {
            return 0;
        }
        self.slope(amount)
            .saturating_mul((unlock_time - now) as u128)
    }

    pub fn lock_power(&self, lock: &Lock, now: Timestamp) -> Power {
        self.power(lock.amount, lock.unlock_time, now)
    }

    /// Round `ts` down to the enclosing epoch boundary.
    pub fn round_to_epoch(&self, ts: Timestamp) -> Timestamp {
        ts.div_euclid(self.epoch_secs) * self.epoch_secs
    }

    /// Unlock time for a lock of `duration_secs` started at `now`.
    ///
    /// Rejects durations outside the configured bounds, and durations that
    /// round down to an unlock time at or before `now`.
    pub fn unlock_time_for(
        &self,
        now: Timestamp,
        duration_secs: i64,
    ) -> Result<Timestamp, VelockError> {
        self.check_duration(duration_secs)?;
        let unlock_time = self.round_to_epoch(now.saturating_add(duration_secs));
        if unlock_time <= now {
            return Err(self.invalid_duration(unlock_time - now));
        }
        Ok(unlock_time)
    }

    pub fn check_duration(&self, duration_secs: i64) -> Result<(), VelockError> {
        if duration_secs < self.min_lock_secs || duration_secs > self.max_lock_secs {
            return Err(self.invalid_duration(duration_secs));
        }
        Ok(())
    }

    pub fn invalid_duration(&self, duration_secs: i64) -> VelockError {
        VelockError::InvalidDuration {
            duration_secs,
            min_secs: self.min_lock_secs,
            max_secs: self.max_lock_secs,
        }
    }

    /// Validate a lock principal (new or post-increase total).
    pub fn check_amount(&self, amount: Balance) -> Result<(), VelockError> {
        if amount == 0 {
            return Err(VelockError::ZeroAmount);
        }
        if amount > MAX_LOCK_AMOUNT {
            return Err(VelockError::AmountTooLarge {
                amount,
                max: MAX_LOCK_AMOUNT,
            });
        }
        Ok(())
    }
}
