//! Battle resolution - one battle played to completion
//!
//! The resolver is pluggable: anything implementing [`CombatResolver`] can be
//! driven by the odds calculator. [`StandardDiceResolver`] is the reference
//! dice combat used when no other resolver is supplied.
//!
//! Key rules for resolvers:
//! - Every random draw goes through [`BattleBridge::random`]
//! - Every state mutation goes through [`BattleBridge::add_change`]
//! - Player decisions come from [`BattleBridge::policy`]

pub mod bridge;
pub mod dice;
pub mod resolver;

pub use bridge::{BattleBridge, SimulationBridge};
pub use dice::StandardDiceResolver;
pub use resolver::{BattleOutcome, BattleReport, BattleRequest, BattleSetup, CombatResolver, TerrainEffect};
