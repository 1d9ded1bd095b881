//! velock-state
//!
//! Lock ledger, global checkpoint, lifecycle rules, and the sled-backed
//! engine that ties them together.

pub mod checkpoint;
pub mod db;
pub mod engine;
pub mod ledger;
pub mod lifecycle;

pub use checkpoint::{Advance, GlobalCheckpoint};
pub use db::StateDb;
pub use engine::VeEngine;
pub use ledger::LockLedger;
pub use lifecycle::{LockManager, VeState};
