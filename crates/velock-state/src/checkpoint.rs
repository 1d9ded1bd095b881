//! Aggregate voting-power curve.
//!
//! Total supply is tracked as one line `(bias, slope)` anchored at the last
//! committed timestamp, plus a schedule of slope increases keyed by unlock
//! epoch. Replaying the schedule forward yields total supply at any later
//! time in work proportional to the scheduled epochs crossed, independent of
//! the number of locks.
//!
//! Each lock contributes the line `slope_i × (unlock_i − t)`. Contributions
//! are added and removed as whole lines evaluated at the anchor timestamp, so
//! the aggregate stays exact even when the anchor trails the mutation time
//! (see `advance`).

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

use tracing::{debug, warn};
use velock_core::config::EngineConfig;
use velock_core::curve::PowerCurve;
use velock_core::error::VelockError;
use velock_core::types::{GlobalPoint, Lock, Power, Timestamp};

/// Outcome of one `advance` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Advance {
    /// Segments replayed during this call.
    pub steps: u32,
    /// False if the step ceiling stopped replay short of the target time.
    pub caught_up: bool,
}

#[derive(Clone, Debug)]
pub struct GlobalCheckpoint {
    curve: PowerCurve,
    max_steps: u32,
    point: GlobalPoint,
    /// Timestamp of the most recent `apply_delta`.
    last_update: Timestamp,
    /// Unlock epoch → slope delta applied when the replay reaches it.
    slope_changes: BTreeMap<Timestamp, i128>,
}

impl GlobalCheckpoint {
    pub fn new(config: &EngineConfig) -> Self {
        Self::from_parts(config, GlobalPoint::default(), 0, BTreeMap::new())
    }

    /// Restore a checkpoint from persisted parts.
    pub fn from_parts(
        config: &EngineConfig,
        point: GlobalPoint,
        last_update: Timestamp,
        slope_changes: BTreeMap<Timestamp, i128>,
    ) -> Self {
        Self {
            curve: PowerCurve::new(config),
            max_steps: config.max_checkpoint_steps,
            point,
            last_update,
            slope_changes,
        }
    }

    pub fn point(&self) -> GlobalPoint {
        self.point
    }

    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    pub fn slope_changes(&self) -> &BTreeMap<Timestamp, i128> {
        &self.slope_changes
    }

    /// Earliest timestamp the aggregate curve can answer for.
    pub fn horizon(&self) -> Timestamp {
        self.point.timestamp.max(self.last_update)
    }

    pub fn check_timestamp(&self, ts: Timestamp) -> Result<(), VelockError> {
        let horizon = self.horizon();
        if ts < horizon {
            return Err(VelockError::TimestampBeforeCheckpoint {
                checkpoint: horizon,
                requested: ts,
            });
        }
        Ok(())
    }

    /// Replay the curve forward to `now`, committing the result.
    ///
    /// Each step moves the anchor to the next scheduled slope change (or to
    /// `now` if that comes first), decaying bias along the way and applying
    /// the change on arrival. At most `max_checkpoint_steps` steps run per
    /// call; the remainder is left for the next call.
    ///
    /// Fails only when `now` precedes the horizon, before anything changes.
    pub fn advance(&mut self, now: Timestamp) -> Result<Advance, VelockError> {
        self.check_timestamp(now)?;

        let mut steps = 0;
        while self.point.timestamp < now {
            if steps == self.max_steps {
                warn!(
                    checkpoint = self.point.timestamp,
                    target = now,
                    steps,
                    "checkpoint step ceiling reached; deferring remaining epochs"
                );
                return Ok(Advance { steps, caught_up: false });
            }
            let next_change = self
                .slope_changes
                .range((Excluded(self.point.timestamp), Unbounded))
                .next()
                .map(|(ts, _)| *ts)
                .filter(|ts| *ts <= now);
            match next_change {
                Some(epoch) => {
                    let delta = self.slope_changes.remove(&epoch).unwrap_or(0);
                    self.point = step(self.point, epoch, delta);
                }
                None => self.point = step(self.point, now, 0),
            }
            steps += 1;
        }

        debug!(
            timestamp = self.point.timestamp,
            bias = self.point.bias,
            slope = self.point.slope,
            steps,
            "checkpoint advanced"
        );
        Ok(Advance { steps, caught_up: true })
    }

    /// Replace one lock's contribution with another's.
    ///
    /// Call after `advance(now)`. `old` is the lock as it stood before the
    /// mutation (omit for a fresh lock), `new` the lock afterwards (omit on
    /// removal). Locks already past the anchor contribute nothing.
    ///
    /// Fails with `SupplyOverflow`, leaving the checkpoint untouched, if the
    /// resulting aggregate does not fit in `i128`.
    pub fn apply_delta(
        &mut self,
        old: Option<&Lock>,
        new: Option<&Lock>,
        now: Timestamp,
    ) -> Result<(), VelockError> {
        let anchor = self.point.timestamp;
        let removed = self.line_at(old, anchor)?;
        let added = self.line_at(new, anchor)?;

        let bias = self
            .point
            .bias
            .checked_sub(removed.map_or(0, |(_, _, b)| b))
            .and_then(|b| b.checked_add(added.map_or(0, |(_, _, b)| b)))
            .ok_or(VelockError::SupplyOverflow)?;
        let slope = self
            .point
            .slope
            .checked_sub(removed.map_or(0, |(_, s, _)| s))
            .and_then(|s| s.checked_add(added.map_or(0, |(_, s, _)| s)))
            .ok_or(VelockError::SupplyOverflow)?;
        let mut changes = Vec::with_capacity(2);
        if let Some((unlock, s, _)) = removed {
            changes.push((unlock, s));
        }
        if let Some((unlock, s, _)) = added {
            changes.push((unlock, -s));
        }
        let rows = self.scheduled_rows(&changes)?;

        for (epoch, delta) in rows {
            if delta == 0 {
                self.slope_changes.remove(&epoch);
            } else {
                self.slope_changes.insert(epoch, delta);
            }
        }
        self.point.bias = bias.max(0);
        self.point.slope = slope.max(0);
        self.last_update = self.last_update.max(now);
        Ok(())
    }

    /// Commit catch-up to `now` and return total supply at `now`.
    ///
    /// If the step ceiling cuts the replay short, the committed part is kept
    /// and the rest is projected without committing.
    pub fn total_supply(&mut self, now: Timestamp) -> Result<Power, VelockError> {
        let advance = self.advance(now)?;
        if advance.caught_up {
            return Ok(self.point.bias as Power);
        }
        self.total_supply_at(now)
    }

    /// Total supply at `ts` without committing any replay.
    pub fn total_supply_at(&self, ts: Timestamp) -> Result<Power, VelockError> {
        self.check_timestamp(ts)?;
        let mut point = self.point;
        for (&epoch, &delta) in self
            .slope_changes
            .range((Excluded(point.timestamp), Included(ts)))
        {
            point = step(point, epoch, delta);
        }
        Ok(step(point, ts, 0).bias as Power)
    }

    /// Schedule rows that differ from `before`: `Some(delta)` to write,
    /// `None` to delete.
    pub fn schedule_diff(&self, before: &GlobalCheckpoint) -> Vec<(Timestamp, Option<i128>)> {
        let removed = before
            .slope_changes
            .keys()
            .filter(|ts| !self.slope_changes.contains_key(*ts))
            .map(|ts| (*ts, None));
        let written = self
            .slope_changes
            .iter()
            .filter(|(ts, delta)| before.slope_changes.get(*ts) != Some(*delta))
            .map(|(ts, delta)| (*ts, Some(*delta)));
        removed.chain(written).collect()
    }

    /// `(unlock, slope, bias at anchor)` of a lock still live at `anchor`.
    fn line_at(
        &self,
        lock: Option<&Lock>,
        anchor: Timestamp,
    ) -> Result<Option<(Timestamp, i128, i128)>, VelockError> {
        let Some(lock) = lock.filter(|l| l.unlock_time > anchor) else {
            return Ok(None);
        };
        let slope = self.curve.signed_slope(lock.amount)?;
        let bias = slope
            .checked_mul((lock.unlock_time - anchor) as i128)
            .ok_or(VelockError::SupplyOverflow)?;
        Ok(Some((lock.unlock_time, slope, bias)))
    }

    /// Schedule rows after folding `changes` in; a zero row is to be removed.
    fn scheduled_rows(
        &self,
        changes: &[(Timestamp, i128)],
    ) -> Result<BTreeMap<Timestamp, i128>, VelockError> {
        let mut rows = BTreeMap::new();
        for &(epoch, delta) in changes {
            let current = match rows.get(&epoch) {
                Some(v) => *v,
                None => self.slope_changes.get(&epoch).copied().unwrap_or(0),
            };
            let next = current
                .checked_add(delta)
                .ok_or(VelockError::SupplyOverflow)?;
            rows.insert(epoch, next);
        }
        Ok(rows)
    }
}

/// Move `point` forward to `to`, then apply `delta` to its slope.
fn step(point: GlobalPoint, to: Timestamp, delta: i128) -> GlobalPoint {
    let elapsed = (to - point.timestamp).max(0) as i128;
    GlobalPoint {
        timestamp: to,
        bias: point.bias.saturating_sub(point.slope.saturating_mul(elapsed)).max(0),
        slope: point.slope.saturating_add(delta).max(0),
    }
}
