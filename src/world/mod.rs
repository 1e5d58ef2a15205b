//! World state the calculator simulates on, and the change log that undoes it

pub mod change;
pub mod loader;
pub mod snapshot;
pub mod unit;

pub use change::{Change, ChangeRecord, ChangeScope, HitUpdate};
pub use loader::{ForceEntry, Scenario, ScenarioFile, ScenarioLoader};
pub use snapshot::{Location, Player, WorldSnapshot, DEFAULT_DICE_SIDES};
pub use unit::{Unit, UnitCostModel, UnitType, UnitTypeCatalog};
