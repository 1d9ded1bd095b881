//! Reference lock scenarios: multipliers, extend, increase, withdraw.

use std::sync::Arc;

use velock_core::constants::{
    EPOCH_SECS, MAX_LOCK_SECS, MIN_LOCK_SECS, POWER_PRECISION, UNITS_PER_TOKEN, YEAR_SECS,
};
use velock_core::{AccountId, EngineConfig, Power, VelockError};
use velock_state::{StateDb, VeEngine};

/// An epoch-aligned start time so whole-epoch durations are exact.
const NOW: i64 = 2_900 * EPOCH_SECS;

fn engine() -> VeEngine {
    let db = Arc::new(StateDb::temporary().expect("temporary db"));
    VeEngine::open(db, EngineConfig::default()).expect("open engine")
}

fn tokens(power: Power) -> f64 {
    power as f64 / (POWER_PRECISION * UNITS_PER_TOKEN) as f64
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

#[test]
fn scenario_a_four_year_lock_is_four_x() {
    let ve = engine();
    let alice = AccountId::from_label("alice");
    ve.create_lock(&alice, 1_000 * UNITS_PER_TOKEN, MAX_LOCK_SECS, NOW).unwrap();

    let power = tokens(ve.voting_power(&alice, NOW));
    assert_close(power, 4_000.0, 1e-6);
    assert_close(power / 1_000.0, 4.0, 1e-9);
    assert_close(tokens(ve.total_supply(NOW).unwrap()), 4_000.0, 1e-6);
}

#[test]
fn scenario_b_one_week_lock() {
    let ve = engine();
    let bob = AccountId::from_label("bob");
    ve.create_lock(&bob, 100 * UNITS_PER_TOKEN, MIN_LOCK_SECS, NOW).unwrap();

    let power = tokens(ve.voting_power(&bob, NOW));
    assert_close(power, 1.92, 0.01);
    assert_close(power / 100.0, 0.0192, 0.0001);
}

#[test]
fn scenario_c_extend_one_year_to_two() {
    let ve = engine();
    let carol = AccountId::from_label("carol");
    ve.create_lock(&carol, 1_000 * UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();
    assert_close(tokens(ve.voting_power(&carol, NOW)), 1_000.0, 1e-6);

    let extended = ve.extend_lock_duration(&carol, 2 * YEAR_SECS, NOW).unwrap();
    assert_eq!(extended.amount, 1_000 * UNITS_PER_TOKEN);
    assert_eq!(extended.unlock_time, NOW + 2 * YEAR_SECS);
    assert_close(tokens(ve.voting_power(&carol, NOW)), 2_000.0, 1e-6);
    assert_close(tokens(ve.total_supply(NOW).unwrap()), 2_000.0, 1e-6);
}

#[test]
fn scenario_d_increase_on_two_year_lock() {
    let ve = engine();
    let dave = AccountId::from_label("dave");
    let created = ve.create_lock(&dave, 1_000 * UNITS_PER_TOKEN, 2 * YEAR_SECS, NOW).unwrap();
    let before = ve.voting_power(&dave, NOW);

    let increased = ve.increase_amount(&dave, 500 * UNITS_PER_TOKEN, NOW).unwrap();
    let after = ve.voting_power(&dave, NOW);

    assert_eq!(increased.unlock_time, created.unlock_time);
    assert_eq!(increased.amount, 1_500 * UNITS_PER_TOKEN);
    assert_close(tokens(after - before), 1_000.0, 1e-6);
}

#[test]
fn scenario_e_withdraw_only_after_unlock() {
    let ve = engine();
    let erin = AccountId::from_label("erin");
    let lock = ve.create_lock(&erin, 250 * UNITS_PER_TOKEN, 4 * EPOCH_SECS, NOW).unwrap();

    let early = ve.withdraw(&erin, lock.unlock_time - 1).unwrap_err();
    assert_eq!(early, VelockError::LockNotExpired { unlock_time: lock.unlock_time });
    assert!(ve.lock_info(&erin).is_some());

    let released = ve.withdraw(&erin, lock.unlock_time).unwrap();
    assert_eq!(released.amount, 250 * UNITS_PER_TOKEN);
    assert_eq!(ve.voting_power(&erin, lock.unlock_time), 0);
    assert!(ve.lock_info(&erin).is_none());
    assert_eq!(ve.total_supply(lock.unlock_time + 1).unwrap(), 0);
}

#[test]
fn mid_epoch_lock_is_quantized_within_one_epoch() {
    let ve = engine();
    let frank = AccountId::from_label("frank");
    let now = NOW + 3 * 24 * 3600 + 17;
    let lock = ve.create_lock(&frank, 1_000 * UNITS_PER_TOKEN, YEAR_SECS, now).unwrap();

    assert_eq!(lock.unlock_time % EPOCH_SECS, 0);
    let power = tokens(ve.voting_power(&frank, now));
    let one_epoch_of_boost = 1_000.0 * 4.0 * EPOCH_SECS as f64 / MAX_LOCK_SECS as f64;
    assert!(power <= 1_000.0);
    assert!(power > 1_000.0 - one_epoch_of_boost, "power {power}");
}

#[test]
fn power_decays_linearly_to_zero() {
    let ve = engine();
    let gina = AccountId::from_label("gina");
    ve.create_lock(&gina, 1_000 * UNITS_PER_TOKEN, YEAR_SECS, NOW).unwrap();

    assert_close(tokens(ve.voting_power(&gina, NOW + YEAR_SECS / 2)), 500.0, 1e-6);
    let mut last = ve.voting_power(&gina, NOW);
    for week in 1..=52 {
        let p = ve.voting_power(&gina, NOW + week * EPOCH_SECS);
        assert!(p < last);
        last = p;
    }
    assert_eq!(last, 0);
    assert_eq!(ve.voting_power(&gina, NOW + 2 * YEAR_SECS), 0);
}
