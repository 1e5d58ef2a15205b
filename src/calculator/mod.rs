//! Odds calculation: many repetitions of one battle, reduced to statistics

pub mod aggregate;
pub mod odds;
pub mod repetition;
pub(crate) mod scheduler;

pub use aggregate::{AggregateResult, AggregateSummary};
pub use odds::{CancelHandle, OddsCalculator};
pub use repetition::{run_one, RepetitionResult};
