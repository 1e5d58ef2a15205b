//! One repetition: play a battle on the snapshot, capture, restore

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::battle::bridge::{BattleBridge, SimulationBridge};
use crate::battle::resolver::{BattleOutcome, BattleSetup, CombatResolver};
use crate::core::error::Result;
use crate::core::types::{Side, UnitId};
use crate::policy::SidePolicies;
use crate::world::snapshot::WorldSnapshot;
use crate::world::unit::Unit;

/// Outcome of one simulated battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionResult {
    pub outcome: BattleOutcome,
    pub rounds: u32,
    /// Full copies, hits included, taken before the snapshot was restored
    pub attacker_remaining: Vec<Unit>,
    pub defender_remaining: Vec<Unit>,
}

impl RepetitionResult {
    pub fn remaining(&self, side: Side) -> &[Unit] {
        match side {
            Side::Attacker => &self.attacker_remaining,
            Side::Defender => &self.defender_remaining,
        }
    }

    pub fn units_left(&self, side: Side) -> usize {
        self.remaining(side).len()
    }
}

fn capture(world: &WorldSnapshot, ids: &[UnitId]) -> Result<Vec<Unit>> {
    ids.iter().map(|id| world.require_unit(*id).cloned()).collect()
}

/// Run one battle and leave the snapshot as it was found
///
/// Restoration also happens when the resolver errors or panics; only an
/// explicit rollback failure on the success path is reported.
pub fn run_one(
    world: &mut WorldSnapshot,
    battle: &BattleSetup,
    policies: &SidePolicies,
    resolver: &dyn CombatResolver,
    rng: &mut ChaCha8Rng,
) -> Result<RepetitionResult> {
    let mut bridge = SimulationBridge::new(world, rng, policies);
    let report = resolver.fight(battle, &mut bridge)?;

    let result = RepetitionResult {
        outcome: report.outcome,
        rounds: report.rounds,
        attacker_remaining: capture(bridge.world(), &report.attacker_remaining)?,
        defender_remaining: capture(bridge.world(), &report.defender_remaining)?,
    };
    bridge.rollback()?;
    Ok(result)
}
