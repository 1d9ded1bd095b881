use serde::{Deserialize, Serialize};

use crate::constants::{
    EPOCH_SECS, MAX_BOOST, MAX_CHECKPOINT_STEPS, MAX_LOCK_AMOUNT, MAX_LOCK_SECS, MIN_LOCK_SECS,
    POWER_PRECISION,
};
use crate::error::VelockError;

/// What `create_lock` does when the owner already holds an active lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    /// Fail with `LockAlreadyExists`; callers must increase/extend instead.
    #[default]
    RejectIfActive,
    /// Fold the request into the existing lock: add the amount and move the
    /// unlock time to the later of the two.
    Merge,
}

/// Tunable engine parameters.
///
/// The curve fields (`epoch_secs`, `min_lock_secs`, `max_lock_secs`,
/// `max_boost`) are fixed for the lifetime of a database; the remaining
/// fields may change between runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unlock-time rounding granularity in seconds.
    pub epoch_secs: i64,
    /// Shortest permitted lock duration.
    pub min_lock_secs: i64,
    /// Longest permitted lock duration; earns `max_boost`.
    pub max_lock_secs: i64,
    /// Power multiplier at `max_lock_secs`.
    pub max_boost: u128,
    /// Per-call ceiling on epochs replayed by the global checkpoint.
    pub max_checkpoint_steps: u32,
    pub create_policy: CreatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epoch_secs: EPOCH_SECS,
            min_lock_secs: MIN_LOCK_SECS,
            max_lock_secs: MAX_LOCK_SECS,
            max_boost: MAX_BOOST,
            max_checkpoint_steps: MAX_CHECKPOINT_STEPS,
            create_policy: CreatePolicy::RejectIfActive,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), VelockError> {
        if self.epoch_secs <= 0 {
            return Err(VelockError::InvalidConfig("epoch_secs must be positive".into()));
        }
        if self.min_lock_secs <= 0 || self.min_lock_secs > self.max_lock_secs {
            return Err(VelockError::InvalidConfig(format!(
                "lock bounds [{}, {}] are not a valid range",
                self.min_lock_secs, self.max_lock_secs
            )));
        }
        if self.max_lock_secs % self.epoch_secs != 0 {
            return Err(VelockError::InvalidConfig(
                "max_lock_secs must be a whole number of epochs".into(),
            ));
        }
        if self.max_boost == 0 {
            return Err(VelockError::InvalidConfig("max_boost must be at least 1".into()));
        }
        // A single maximum-size lock at full term must fit the signed aggregate.
        let peak = MAX_LOCK_AMOUNT
            .checked_mul(self.max_boost)
            .and_then(|p| p.checked_mul(POWER_PRECISION))
            .filter(|p| i128::try_from(*p).is_ok());
        if peak.is_none() {
            return Err(VelockError::InvalidConfig(format!(
                "max_boost {} overflows the power range for a {} unit lock",
                self.max_boost, MAX_LOCK_AMOUNT
            )));
        }
        if self.max_checkpoint_steps == 0 {
            return Err(VelockError::InvalidConfig(
                "max_checkpoint_steps must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// True if `other` describes the same power curve (and so the same
    /// stored slopes) as `self`.
    pub fn same_curve(&self, other: &EngineConfig) -> bool {
        self.epoch_secs == other.epoch_secs
            && self.min_lock_secs == other.min_lock_secs
            && self.max_lock_secs == other.max_lock_secs
            && self.max_boost == other.max_boost
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, VelockError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| VelockError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
