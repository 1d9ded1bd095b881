/// ─── Velock Protocol Constants ──────────────────────────────────────────────
///
/// Vote-escrow lock accounting: a locked principal earns voting power that
/// decays linearly to zero at its unlock time.
///
/// Base unit:  1 token = 1,000,000 units
/// Power unit: 1 unit of power = POWER_PRECISION scaled power

// ── Amounts ──────────────────────────────────────────────────────────────────

/// One whole token expressed in base units.
pub const UNITS_PER_TOKEN: u128 = 1_000_000;

/// Upper bound on the principal of a single lock (base units).
/// Keeps `amount * MAX_BOOST * POWER_PRECISION` comfortably inside u128.
pub const MAX_LOCK_AMOUNT: u128 = 1_000_000_000_000_000_000_000_000; // 10^24

/// Fixed-point scale applied to power and slope values.
pub const POWER_PRECISION: u128 = 1_000_000_000_000; // 10^12

// ── Time ─────────────────────────────────────────────────────────────────────

/// Epoch length in seconds. Every unlock time is a multiple of this.
pub const EPOCH_SECS: i64 = 7 * 24 * 3600;

/// One lock year, expressed as a whole number of epochs (52 weeks).
pub const YEAR_SECS: i64 = 52 * EPOCH_SECS;

/// Shortest permitted lock: one epoch.
pub const MIN_LOCK_SECS: i64 = EPOCH_SECS;

/// Longest permitted lock: four lock years (208 epochs).
pub const MAX_LOCK_SECS: i64 = 4 * YEAR_SECS;

// ── Curve ────────────────────────────────────────────────────────────────────

/// Power multiplier granted to a lock of `MAX_LOCK_SECS`.
/// A one-year lock therefore receives 1x, a four-year lock 4x.
pub const MAX_BOOST: u128 = 4;

// ── Checkpointing ────────────────────────────────────────────────────────────

/// Maximum epochs the global checkpoint replays in a single call.
/// Remaining epochs are carried over to the next call.
pub const MAX_CHECKPOINT_STEPS: u32 = 255;
