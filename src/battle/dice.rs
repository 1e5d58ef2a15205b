//! Reference dice combat
//!
//! Each round every unit rolls one die and scores a hit when the roll is
//! below its strength. Both sides fire before either takes losses.
//!
//! Targeting:
//! - submarines only hit surface and land units
//! - aircraft cannot hit submarines unless their side brings a destroyer
//! - bombarding ships fire in the first round only, never at aircraft
//!
//! Multi-hit units soak damage before anything dies. Submarines facing no
//! destroyer may submerge at the start of a round; the attacker may retreat
//! at the end of one.

use ahash::AHashMap;
use ordered_float::OrderedFloat;

use crate::battle::bridge::BattleBridge;
use crate::battle::resolver::{BattleOutcome, BattleReport, BattleSetup, CombatResolver};
use crate::core::error::Result;
use crate::core::types::{Side, UnitId};
use crate::policy::{CasualtyDetails, CasualtyQuery, RetreatQuery};
use crate::world::change::Change;
use crate::world::snapshot::WorldSnapshot;
use crate::world::unit::{UnitCostModel, UnitType};

/// Which enemy units a group of hits may land on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetClass {
    NonAir,
    NonSub,
    All,
}

impl TargetClass {
    /// Most restrictive first, so narrow hits get first pick
    const ORDER: [TargetClass; 3] = [TargetClass::NonAir, TargetClass::NonSub, TargetClass::All];

    fn index(self) -> usize {
        match self {
            TargetClass::NonAir => 0,
            TargetClass::NonSub => 1,
            TargetClass::All => 2,
        }
    }

    fn admits(self, target: &UnitType) -> bool {
        match self {
            TargetClass::NonAir => !target.is_air,
            TargetClass::NonSub => !target.is_sub,
            TargetClass::All => true,
        }
    }
}

type Hits = [usize; 3];

/// Mutable state of one battle
struct Engagement<'b> {
    battle: &'b BattleSetup,
    attacking: Vec<UnitId>,
    defending: Vec<UnitId>,
    /// Side that retreated or submerged
    withdrawn: Option<Side>,
    rounds: u32,
}

impl<'b> Engagement<'b> {
    fn new(battle: &'b BattleSetup) -> Self {
        Self {
            battle,
            attacking: battle.attacking.clone(),
            defending: battle.defending.clone(),
            withdrawn: None,
            rounds: 0,
        }
    }

    fn forces(&self, side: Side) -> &[UnitId] {
        match side {
            Side::Attacker => &self.attacking,
            Side::Defender => &self.defending,
        }
    }

    fn forces_mut(&mut self, side: Side) -> &mut Vec<UnitId> {
        match side {
            Side::Attacker => &mut self.attacking,
            Side::Defender => &mut self.defending,
        }
    }

    fn is_over(&self) -> bool {
        self.withdrawn.is_some() || self.attacking.is_empty() || self.defending.is_empty()
    }

    fn into_report(self) -> BattleReport {
        let outcome = match self.withdrawn {
            Some(Side::Attacker) => BattleOutcome::DefenderWon,
            Some(Side::Defender) => BattleOutcome::AttackerWon,
            None => match (self.attacking.is_empty(), self.defending.is_empty()) {
                (false, true) => BattleOutcome::AttackerWon,
                (true, false) => BattleOutcome::DefenderWon,
                // Mutual destruction, or still fighting at the round limit
                _ => BattleOutcome::Draw,
            },
        };
        BattleReport {
            outcome,
            rounds: self.rounds,
            attacker_remaining: self.attacking,
            defender_remaining: self.defending,
        }
    }
}

/// Strength after terrain, clamped to the die
fn effective_strength(unit_type: &UnitType, side: Side, terrain: i32, dice_sides: u32) -> u32 {
    let base = i64::from(unit_type.strength(side));
    let adjusted = if unit_type.is_land() {
        base + i64::from(terrain)
    } else {
        base
    };
    adjusted.clamp(0, i64::from(dice_sides)) as u32
}

fn remaining_hit_points(world: &WorldSnapshot, id: UnitId, pending: &AHashMap<UnitId, u32>) -> Result<u32> {
    let unit = world.require_unit(id)?;
    let unit_type = world.catalog().require(&unit.unit_type)?;
    let already = unit.hits + pending.get(&id).copied().unwrap_or(0);
    Ok(unit_type.hit_points.saturating_sub(already))
}

/// Damage multi-hit units first, then kill the weakest and cheapest
fn default_casualties(
    world: &WorldSnapshot,
    side: Side,
    candidates: &[UnitId],
    pending: &AHashMap<UnitId, u32>,
    hits: usize,
) -> Result<CasualtyDetails> {
    let mut left = hits;
    let mut damaged = Vec::new();
    for id in candidates {
        if left == 0 {
            break;
        }
        let spare = remaining_hit_points(world, *id, pending)?.saturating_sub(1) as usize;
        let absorbed = spare.min(left);
        damaged.extend(std::iter::repeat(*id).take(absorbed));
        left -= absorbed;
    }

    let mut kill_order = Vec::with_capacity(candidates.len());
    for id in candidates {
        let unit_type = world.unit_type_of(*id)?;
        kill_order.push((unit_type.strength(side), OrderedFloat(world.catalog().unit_cost(&unit_type.name)), *id));
    }
    kill_order.sort();
    let killed = kill_order.into_iter().take(left).map(|(_, _, id)| id).collect();

    Ok(CasualtyDetails::new(killed, damaged))
}

/// Check a policy's answer against the hits it had to absorb
fn is_valid_selection(
    world: &WorldSnapshot,
    candidates: &[UnitId],
    pending: &AHashMap<UnitId, u32>,
    answer: &CasualtyDetails,
    expected: usize,
) -> Result<bool> {
    if answer.hits_absorbed() != expected {
        return Ok(false);
    }
    for (i, id) in answer.killed.iter().enumerate() {
        if !candidates.contains(id) || answer.killed[..i].contains(id) {
            return Ok(false);
        }
    }
    let mut extra: AHashMap<UnitId, u32> = AHashMap::new();
    for id in &answer.damaged {
        if !candidates.contains(id) {
            return Ok(false);
        }
        *extra.entry(*id).or_insert(0) += 1;
    }
    for (id, count) in extra {
        if count >= remaining_hit_points(world, id, pending)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Conventional dice combat
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDiceResolver;

impl StandardDiceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Offer submarines facing no destroyer the chance to slip away
    fn submerge_phase(&self, state: &mut Engagement<'_>, bridge: &mut dyn BattleBridge) -> Result<bool> {
        let destinations = [state.battle.location];
        for side in [Side::Attacker, Side::Defender] {
            let world = bridge.world();
            let own = state.forces(side);
            let enemy = state.forces(side.opponent());
            if own.is_empty() {
                continue;
            }
            let mut all_subs = true;
            for id in own {
                all_subs &= world.unit_type_of(*id)?.is_sub;
            }
            let mut enemy_destroyer = false;
            for id in enemy {
                enemy_destroyer |= world.unit_type_of(*id)?.is_destroyer;
            }
            if !all_subs || enemy_destroyer {
                continue;
            }

            let query = RetreatQuery {
                world,
                side,
                round: state.rounds,
                submerge: true,
                battle_site: state.battle.location,
                own_units: own,
                enemy_units: enemy,
                destinations: &destinations,
            };
            if bridge.policy(side).retreat_query(&query)?.is_some() {
                tracing::debug!("{:?} submerged in round {}", side, state.rounds);
                state.withdrawn = Some(side);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn roll_hits(&self, state: &Engagement<'_>, bridge: &mut dyn BattleBridge, side: Side) -> Result<Hits> {
        let world = bridge.world();
        let dice_sides = world.dice_sides();
        let terrain = state.battle.terrain_modifier(side);
        let own = state.forces(side);

        let mut own_destroyer = false;
        for id in own {
            own_destroyer |= world.unit_type_of(*id)?.is_destroyer;
        }

        let mut firing = Vec::with_capacity(own.len());
        for id in own {
            let unit_type = world.unit_type_of(*id)?;
            let class = if unit_type.is_sub {
                TargetClass::NonAir
            } else if unit_type.is_air && !own_destroyer {
                TargetClass::NonSub
            } else {
                TargetClass::All
            };
            firing.push((effective_strength(unit_type, side, terrain, dice_sides), class));
        }
        if side.is_attacker() && state.rounds == 1 {
            for id in &state.battle.bombarding {
                let unit_type = world.unit_type_of(*id)?;
                firing.push((effective_strength(unit_type, side, 0, dice_sides), TargetClass::NonAir));
            }
        }

        let annotation = match side {
            Side::Attacker => "attacker roll",
            Side::Defender => "defender roll",
        };
        let mut hits: Hits = [0; 3];
        for (strength, class) in firing {
            if strength == 0 {
                continue;
            }
            if bridge.random(dice_sides, annotation) < strength {
                hits[class.index()] += 1;
            }
        }
        Ok(hits)
    }

    /// Pick the casualties `side` suffers from the enemy's hits
    fn select_losses(
        &self,
        state: &Engagement<'_>,
        bridge: &mut dyn BattleBridge,
        side: Side,
        hits: Hits,
    ) -> Result<CasualtyDetails> {
        let world = bridge.world();
        let mut losses = CasualtyDetails::default();
        let mut pending: AHashMap<UnitId, u32> = AHashMap::new();

        for class in TargetClass::ORDER {
            let count = hits[class.index()];
            if count == 0 {
                continue;
            }
            let mut candidates = Vec::new();
            for id in state.forces(side) {
                if !losses.killed.contains(id) && class.admits(world.unit_type_of(*id)?) {
                    candidates.push(*id);
                }
            }
            if candidates.is_empty() {
                continue;
            }

            let defaults = default_casualties(world, side, &candidates, &pending, count)?;
            let chosen = if defaults.killed.len() == candidates.len() {
                defaults
            } else {
                let query = CasualtyQuery {
                    world,
                    side,
                    candidates: &candidates,
                    hits: count,
                    defaults: &defaults,
                };
                let answer = bridge.policy(side).select_casualties(&query)?;
                if is_valid_selection(world, &candidates, &pending, &answer, defaults.hits_absorbed())? {
                    answer
                } else {
                    tracing::warn!("Ignoring invalid casualty selection for {:?}: {:?}", side, answer);
                    defaults
                }
            };

            for id in &chosen.damaged {
                *pending.entry(*id).or_insert(0) += 1;
            }
            losses.killed.extend(chosen.killed);
            losses.damaged.extend(chosen.damaged);
        }
        Ok(losses)
    }

    fn apply_losses(
        &self,
        state: &mut Engagement<'_>,
        bridge: &mut dyn BattleBridge,
        side: Side,
        losses: CasualtyDetails,
    ) -> Result<()> {
        if !losses.damaged.is_empty() {
            let change = Change::add_hits(bridge.world(), &losses.damaged)?;
            bridge.add_change(change)?;
        }
        if !losses.killed.is_empty() {
            let change = Change::remove_units(bridge.world(), state.battle.location, &losses.killed)?;
            bridge.add_change(change)?;
            state.forces_mut(side).retain(|id| !losses.killed.contains(id));
        }
        Ok(())
    }

    fn fire_round(&self, state: &mut Engagement<'_>, bridge: &mut dyn BattleBridge) -> Result<()> {
        let attack_hits = self.roll_hits(state, bridge, Side::Attacker)?;
        let defense_hits = self.roll_hits(state, bridge, Side::Defender)?;

        let defender_losses = self.select_losses(state, bridge, Side::Defender, attack_hits)?;
        let attacker_losses = self.select_losses(state, bridge, Side::Attacker, defense_hits)?;

        self.apply_losses(state, bridge, Side::Defender, defender_losses)?;
        self.apply_losses(state, bridge, Side::Attacker, attacker_losses)
    }

    /// Ask the attacker whether to press on
    fn retreat_phase(&self, state: &mut Engagement<'_>, bridge: &mut dyn BattleBridge) -> Result<bool> {
        let world = bridge.world();
        if state.battle.amphibious {
            for id in &state.attacking {
                if world.unit_type_of(*id)?.is_land() {
                    return Ok(false);
                }
            }
        }

        let destinations = [state.battle.location];
        let query = RetreatQuery {
            world,
            side: Side::Attacker,
            round: state.rounds,
            submerge: false,
            battle_site: state.battle.location,
            own_units: &state.attacking,
            enemy_units: &state.defending,
            destinations: &destinations,
        };
        if bridge.policy(Side::Attacker).retreat_query(&query)?.is_some() {
            tracing::debug!("Attacker retreated after round {}", state.rounds);
            state.withdrawn = Some(Side::Attacker);
            return Ok(true);
        }
        Ok(false)
    }
}

impl CombatResolver for StandardDiceResolver {
    fn fight(&self, battle: &BattleSetup, bridge: &mut dyn BattleBridge) -> Result<BattleReport> {
        let mut state = Engagement::new(battle);

        while !state.is_over() && state.rounds < battle.max_rounds {
            state.rounds += 1;
            if self.submerge_phase(&mut state, bridge)? {
                break;
            }
            self.fire_round(&mut state, bridge)?;
            if state.is_over() {
                break;
            }
            if self.retreat_phase(&mut state, bridge)? {
                break;
            }
        }

        Ok(state.into_report())
    }
}
