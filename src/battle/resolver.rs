//! Combat resolver contract
//!
//! A resolver plays one battle to completion. It never touches the snapshot
//! directly: random draws, state changes and player decisions all go through
//! the [`BattleBridge`] it is handed.

use serde::{Deserialize, Serialize};

use crate::battle::bridge::BattleBridge;
use crate::core::error::Result;
use crate::core::types::{LocationId, PlayerId, Side, UnitId};
use crate::world::unit::Unit;

/// How a single battle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleOutcome {
    AttackerWon,
    DefenderWon,
    /// Mutual destruction or round limit reached
    Draw,
}

impl BattleOutcome {
    /// Did the given side win?
    pub fn won_by(self, side: Side) -> bool {
        matches!(
            (self, side),
            (BattleOutcome::AttackerWon, Side::Attacker) | (BattleOutcome::DefenderWon, Side::Defender)
        )
    }

    pub fn winner(self) -> Option<Side> {
        match self {
            BattleOutcome::AttackerWon => Some(Side::Attacker),
            BattleOutcome::DefenderWon => Some(Side::Defender),
            BattleOutcome::Draw => None,
        }
    }
}

/// Flat strength modifier for land units fighting at a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainEffect {
    pub name: String,
    #[serde(default)]
    pub attack_modifier: i32,
    #[serde(default)]
    pub defense_modifier: i32,
}

impl TerrainEffect {
    pub fn new(name: &str, attack_modifier: i32, defense_modifier: i32) -> Self {
        Self {
            name: name.to_string(),
            attack_modifier,
            defense_modifier,
        }
    }

    pub fn modifier(&self, side: Side) -> i32 {
        match side {
            Side::Attacker => self.attack_modifier,
            Side::Defender => self.defense_modifier,
        }
    }
}

/// A battle as requested by a caller, before its forces are placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRequest {
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub location: LocationId,
    pub attacking: Vec<Unit>,
    pub defending: Vec<Unit>,
    #[serde(default)]
    pub bombarding: Vec<Unit>,
    #[serde(default)]
    pub terrain_effects: Vec<TerrainEffect>,
}

impl BattleRequest {
    pub fn new(attacker: PlayerId, defender: PlayerId, location: LocationId) -> Self {
        Self {
            attacker,
            defender,
            location,
            attacking: Vec::new(),
            defending: Vec::new(),
            bombarding: Vec::new(),
            terrain_effects: Vec::new(),
        }
    }

    pub fn with_attacking(mut self, units: Vec<Unit>) -> Self {
        self.attacking = units;
        self
    }

    pub fn with_defending(mut self, units: Vec<Unit>) -> Self {
        self.defending = units;
        self
    }

    pub fn with_bombarding(mut self, units: Vec<Unit>) -> Self {
        self.bombarding = units;
        self
    }

    pub fn with_terrain(mut self, effect: TerrainEffect) -> Self {
        self.terrain_effects.push(effect);
        self
    }

    /// Every unit taking part, bombarding ships included
    pub fn all_units(&self) -> impl Iterator<Item = &Unit> {
        self.attacking
            .iter()
            .chain(self.defending.iter())
            .chain(self.bombarding.iter())
    }
}

/// Everything a resolver needs to know about the battle it plays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleSetup {
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub location: LocationId,
    pub attacking: Vec<UnitId>,
    pub defending: Vec<UnitId>,
    /// Ships supporting the attack from outside the location
    pub bombarding: Vec<UnitId>,
    pub terrain_effects: Vec<TerrainEffect>,
    /// Attacking land units landed from the sea and cannot retreat
    pub amphibious: bool,
    pub max_rounds: u32,
}

impl BattleSetup {
    pub fn forces(&self, side: Side) -> &[UnitId] {
        match side {
            Side::Attacker => &self.attacking,
            Side::Defender => &self.defending,
        }
    }

    /// Sum of terrain modifiers for one side
    pub fn terrain_modifier(&self, side: Side) -> i32 {
        self.terrain_effects.iter().map(|t| t.modifier(side)).sum()
    }
}

/// Final state of one battle as seen by the resolver
///
/// Remaining units include those that retreated or submerged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    pub outcome: BattleOutcome,
    pub rounds: u32,
    pub attacker_remaining: Vec<UnitId>,
    pub defender_remaining: Vec<UnitId>,
}

/// Plays a battle to completion
pub trait CombatResolver: Send + Sync {
    fn fight(&self, battle: &BattleSetup, bridge: &mut dyn BattleBridge) -> Result<BattleReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_winner() {
        assert_eq!(BattleOutcome::AttackerWon.winner(), Some(Side::Attacker));
        assert_eq!(BattleOutcome::Draw.winner(), None);
        assert!(BattleOutcome::DefenderWon.won_by(Side::Defender));
        assert!(!BattleOutcome::Draw.won_by(Side::Attacker));
    }

    #[test]
    fn test_terrain_modifiers_sum_per_side() {
        let setup = BattleSetup {
            attacker: PlayerId(1),
            defender: PlayerId(2),
            location: LocationId(1),
            attacking: vec![],
            defending: vec![],
            bombarding: vec![],
            terrain_effects: vec![TerrainEffect::new("river", -1, 0), TerrainEffect::new("hills", 0, 1)],
            amphibious: false,
            max_rounds: 10,
        };
        assert_eq!(setup.terrain_modifier(Side::Attacker), -1);
        assert_eq!(setup.terrain_modifier(Side::Defender), 1);
    }
}
