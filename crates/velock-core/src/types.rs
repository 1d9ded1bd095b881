use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VelockError;

/// Locked principal in base units (1 token = 1_000_000 units).
pub type Balance = u128;

/// Voting power, scaled by `POWER_PRECISION`.
pub type Power = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── AccountId ────────────────────────────────────────────────────────────────

/// 32-byte account identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Derive an account id from a human-readable label as BLAKE3(label).
    pub fn from_label(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base-58 encoded string representation.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, VelockError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| VelockError::InvalidAccountId(e.to_string()))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            VelockError::InvalidAccountId(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b58 = self.to_b58();
        write!(f, "AccountId({})", &b58[..b58.len().min(8)])
    }
}

// ── Lock ─────────────────────────────────────────────────────────────────────

/// A single account's escrowed principal.
///
/// At most one lock exists per owner. `unlock_time` is always a multiple of
/// the engine epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub owner: AccountId,
    pub amount: Balance,
    pub unlock_time: Timestamp,
    pub created_at: Timestamp,
}

impl Lock {
    /// True once `now` has reached the unlock time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.unlock_time
    }

    /// Seconds of lock time left at `now` (zero once expired).
    pub fn remaining_secs(&self, now: Timestamp) -> i64 {
        (self.unlock_time - now).max(0)
    }

    pub fn info(&self) -> LockInfo {
        LockInfo {
            amount: self.amount,
            unlock_time: self.unlock_time,
            created_at: self.created_at,
        }
    }
}

/// Client-facing projection of a lock returned by `getLockInfo`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub amount: Balance,
    pub unlock_time: Timestamp,
    pub created_at: Timestamp,
}

// ── GlobalPoint ──────────────────────────────────────────────────────────────

/// Last committed aggregate curve.
///
/// `bias` is total power at `timestamp`; `slope` is the power lost per second
/// until the next scheduled slope change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPoint {
    pub timestamp: Timestamp,
    pub bias: i128,
    pub slope: i128,
}
