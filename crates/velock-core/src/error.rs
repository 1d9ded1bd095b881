use thiserror::Error;

use crate::types::Timestamp;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VelockError {
    // ── Lock parameter errors ────────────────────────────────────────────────
    #[error("lock duration {duration_secs}s outside [{min_secs}, {max_secs}]")]
    InvalidDuration {
        duration_secs: i64,
        min_secs: i64,
        max_secs: i64,
    },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("lock amount {amount} exceeds maximum of {max} units")]
    AmountTooLarge { amount: u128, max: u128 },

    // ── Lifecycle errors ─────────────────────────────────────────────────────
    #[error("account {0} already holds an active lock")]
    LockAlreadyExists(String),

    #[error("no lock on record for account {0}")]
    LockNotFound(String),

    #[error("lock expired at {unlock_time}; withdraw before locking again")]
    LockExpired { unlock_time: Timestamp },

    #[error("lock not yet expired (unlocks at {unlock_time})")]
    LockNotExpired { unlock_time: Timestamp },

    #[error("new unlock time {requested} must be later than current unlock time {current}")]
    ShorteningNotAllowed {
        current: Timestamp,
        requested: Timestamp,
    },

    // ── Checkpoint errors ────────────────────────────────────────────────────
    #[error("timestamp {requested} precedes last checkpoint at {checkpoint}")]
    TimestampBeforeCheckpoint {
        checkpoint: Timestamp,
        requested: Timestamp,
    },

    #[error("lock would push aggregate voting power past the representable range")]
    SupplyOverflow,

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("engine config does not match the stored curve: {0}")]
    ConfigMismatch(String),

    #[error("invalid account id: {0}")]
    InvalidAccountId(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}
