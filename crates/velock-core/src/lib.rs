pub mod config;
pub mod constants;
pub mod curve;
pub mod error;
pub mod types;

pub use config::{CreatePolicy, EngineConfig};
pub use constants::*;
pub use curve::PowerCurve;
pub use error::VelockError;
pub use types::*;
