use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use velock_core::config::EngineConfig;
use velock_core::error::VelockError;
use velock_core::types::{AccountId, GlobalPoint, Lock, Timestamp};

const GLOBAL_POINT_KEY: &str = "global_point";
const CONFIG_KEY: &str = "config";

/// Persisted form of the global checkpoint anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    pub point: GlobalPoint,
    pub last_update: Timestamp,
}

/// Everything one lifecycle call writes, committed in a single transaction.
#[derive(Clone, Debug, Default)]
pub struct CommitBatch {
    /// Owner row to upsert (`Some(lock)`) or delete (`None`).
    pub lock: Option<(AccountId, Option<Lock>)>,
    pub checkpoint: StoredCheckpoint,
    /// Slope-change rows to upsert (`Some(delta)`) or delete (`None`).
    pub slope_changes: Vec<(Timestamp, Option<i128>)>,
}

/// Persistent lock state backed by sled.
///
/// Named trees:
///   locks          — AccountId bytes      → bincode(Lock)
///   slope_changes  — i64 BE epoch ts      → i128 BE delta
///   meta           — utf8 key bytes       → bincode(StoredCheckpoint) | JSON(EngineConfig)
pub struct StateDb {
    db: sled::Db,
    locks: sled::Tree,
    slope_changes: sled::Tree,
    meta: sled::Tree,
}

fn storage(e: impl std::fmt::Display) -> VelockError {
    VelockError::Storage(e.to_string())
}

fn serialization(e: impl std::fmt::Display) -> VelockError {
    VelockError::Serialization(e.to_string())
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VelockError> {
        Self::from_db(sled::open(path).map_err(storage)?)
    }

    /// Open a throwaway database that is deleted on drop.
    pub fn temporary() -> Result<Self, VelockError> {
        Self::from_db(sled::Config::new().temporary(true).open().map_err(storage)?)
    }

    fn from_db(db: sled::Db) -> Result<Self, VelockError> {
        let locks = db.open_tree("locks").map_err(storage)?;
        let slope_changes = db.open_tree("slope_changes").map_err(storage)?;
        let meta = db.open_tree("meta").map_err(storage)?;
        Ok(Self { db, locks, slope_changes, meta })
    }

    // ── Locks ─────────────────────────────────────────────────────────────────

    pub fn get_lock(&self, owner: &AccountId) -> Result<Option<Lock>, VelockError> {
        match self.locks.get(owner.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(serialization)?)),
            None => Ok(None),
        }
    }

    pub fn iter_locks(&self) -> Result<Vec<Lock>, VelockError> {
        let mut locks = Vec::new();
        for item in self.locks.iter() {
            let (_, bytes) = item.map_err(storage)?;
            locks.push(bincode::deserialize(&bytes).map_err(serialization)?);
        }
        Ok(locks)
    }

    // ── Slope changes ─────────────────────────────────────────────────────────

    pub fn iter_slope_changes(&self) -> Result<BTreeMap<Timestamp, i128>, VelockError> {
        let mut changes = BTreeMap::new();
        for item in self.slope_changes.iter() {
            let (key, value) = item.map_err(storage)?;
            let ts = <[u8; 8]>::try_from(&key[..]).map_err(serialization_len)?;
            let delta = <[u8; 16]>::try_from(&value[..]).map_err(serialization_len)?;
            changes.insert(i64::from_be_bytes(ts), i128::from_be_bytes(delta));
        }
        Ok(changes)
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    pub fn get_checkpoint(&self) -> Result<Option<StoredCheckpoint>, VelockError> {
        match self.meta.get(GLOBAL_POINT_KEY.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(serialization)?)),
            None => Ok(None),
        }
    }

    pub fn get_config(&self) -> Result<Option<EngineConfig>, VelockError> {
        match self.meta.get(CONFIG_KEY.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(serialization)?)),
            None => Ok(None),
        }
    }

    pub fn put_config(&self, config: &EngineConfig) -> Result<(), VelockError> {
        let bytes = serde_json::to_vec(config).map_err(serialization)?;
        self.meta.insert(CONFIG_KEY.as_bytes(), bytes).map_err(storage)?;
        Ok(())
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    /// Apply a batch atomically across all trees.
    pub fn commit(&self, batch: &CommitBatch) -> Result<(), VelockError> {
        let lock_row = match &batch.lock {
            Some((owner, Some(lock))) => Some((
                owner.as_bytes().to_vec(),
                Some(bincode::serialize(lock).map_err(serialization)?),
            )),
            Some((owner, None)) => Some((owner.as_bytes().to_vec(), None)),
            None => None,
        };
        let checkpoint = bincode::serialize(&batch.checkpoint).map_err(serialization)?;

        (&self.locks, &self.slope_changes, &self.meta)
            .transaction(|(locks, slopes, meta)| {
                match &lock_row {
                    Some((key, Some(bytes))) => {
                        locks.insert(key.as_slice(), bytes.as_slice())?;
                    }
                    Some((key, None)) => {
                        locks.remove(key.as_slice())?;
                    }
                    None => {}
                }
                for (ts, delta) in &batch.slope_changes {
                    let key = ts.to_be_bytes();
                    match delta {
                        Some(d) => {
                            slopes.insert(&key[..], &d.to_be_bytes()[..])?;
                        }
                        None => {
                            slopes.remove(&key[..])?;
                        }
                    }
                }
                meta.insert(GLOBAL_POINT_KEY.as_bytes(), checkpoint.as_slice())?;
                Ok::<(), ConflictableTransactionError<VelockError>>(())
            })
            .map_err(|e: TransactionError<VelockError>| match e {
                TransactionError::Abort(inner) => inner,
                TransactionError::Storage(e) => storage(e),
            })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), VelockError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

fn serialization_len(bytes: impl std::fmt::Debug) -> VelockError {
    VelockError::Serialization(format!("malformed slope-change row: {bytes:?}"))
}
