pub mod config;
pub mod error;
pub mod types;

pub use config::{CalculatorConfig, PolicyConfig, SnapshotMode, MAX_RUN_COUNT};
pub use error::{OddsError, Result};
pub use types::{LocationId, PlayerId, Side, UnitId};
