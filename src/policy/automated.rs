//! Rule-driven stand-in player
//!
//! Answers casualty and retreat questions the way a cautious human would set
//! them up in a battle calculator: fixed thresholds, no lookahead.

use ordered_float::OrderedFloat;

use crate::core::config::PolicyConfig;
use crate::core::error::{OddsError, Result};
use crate::core::types::{LocationId, Side, UnitId};
use crate::policy::{CasualtyDetails, CasualtyQuery, DecisionPolicy, RetreatQuery};
use crate::world::snapshot::WorldSnapshot;
use crate::world::unit::UnitCostModel;

/// Power times remaining hit points, normalized by die size
///
/// A coarse single-number estimate of how much punishment a force can deal
/// and take.
pub fn meta_power(world: &WorldSnapshot, units: &[UnitId], side: Side) -> Result<f64> {
    let mut power = 0u64;
    let mut hit_points = 0u64;
    for id in units {
        let unit = world.require_unit(*id)?;
        let unit_type = world.catalog().require(&unit.unit_type)?;
        power += unit_type.strength(side).min(world.dice_sides()) as u64;
        hit_points += unit_type.hit_points.saturating_sub(unit.hits) as u64;
    }
    Ok(power as f64 * hit_points as f64 / world.dice_sides() as f64)
}

#[derive(Debug, Clone, Default)]
pub struct AutomatedPlayer {
    side: Side,
    keep_one_land: bool,
    retreat_after_round: Option<u32>,
    retreat_after_units_left: Option<usize>,
    retreat_when_only_air_left: bool,
    retreat_when_meta_power_is_lower: bool,
    /// Concrete casualty order for this side's force
    order_of_losses: Option<Vec<UnitId>>,
}

impl AutomatedPlayer {
    /// Attacker stand-in: every configured rule applies
    pub fn attacker(config: &PolicyConfig, order_of_losses: Option<Vec<UnitId>>) -> Self {
        Self {
            side: Side::Attacker,
            keep_one_land: config.keep_one_attacking_land_unit,
            retreat_after_round: config.retreat_round(),
            retreat_after_units_left: config.retreat_units_left(),
            retreat_when_only_air_left: config.retreat_when_only_air_left,
            retreat_when_meta_power_is_lower: config.retreat_when_meta_power_is_lower,
            order_of_losses,
        }
    }

    /// Defender stand-in: only the round limit and order of losses apply
    pub fn defender(config: &PolicyConfig, order_of_losses: Option<Vec<UnitId>>) -> Self {
        Self {
            side: Side::Defender,
            retreat_after_round: config.retreat_round(),
            order_of_losses,
            ..Default::default()
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Spare the last land unit by taking the cheapest non-land unit instead
    fn keep_one_land_unit(&self, query: &CasualtyQuery<'_>, killed: &mut Vec<UnitId>) -> Result<()> {
        let world = query.world;
        let is_land = |id: &UnitId| -> Result<bool> { Ok(world.unit_type_of(*id)?.is_land()) };

        let mut survivors_land = false;
        let mut survivors_other = Vec::new();
        for id in query.candidates.iter().filter(|id| !killed.contains(id)) {
            if is_land(id)? {
                survivors_land = true;
            } else {
                survivors_other.push(*id);
            }
        }
        if survivors_land || survivors_other.is_empty() {
            return Ok(());
        }

        let mut spared = None;
        for (idx, id) in killed.iter().enumerate().rev() {
            if is_land(id)? {
                spared = Some(idx);
                break;
            }
        }
        let Some(spared) = spared else {
            return Ok(());
        };

        let catalog = world.catalog();
        let mut cheapest = None;
        for id in survivors_other {
            let cost = catalog.unit_cost(&world.require_unit(id)?.unit_type);
            let key = (OrderedFloat(cost), id);
            if cheapest.map_or(true, |best| key < best) {
                cheapest = Some(key);
            }
        }
        if let Some((_, replacement)) = cheapest {
            killed.remove(spared);
            killed.push(replacement);
        }
        Ok(())
    }

    /// Replace the default kills with the configured casualty order
    fn apply_order_of_losses(&self, query: &CasualtyQuery<'_>, killed: &mut Vec<UnitId>) {
        let Some(order) = &self.order_of_losses else {
            return;
        };
        if killed.is_empty() {
            return;
        }
        let eligible: Vec<UnitId> = order
            .iter()
            .filter(|id| query.candidates.contains(id))
            .copied()
            .collect();
        if eligible.is_empty() {
            return;
        }

        let needed = killed.len();
        let mut chosen: Vec<UnitId> = eligible.into_iter().take(needed).collect();
        for id in &query.defaults.killed {
            if chosen.len() >= needed {
                break;
            }
            if !chosen.contains(id) {
                chosen.push(*id);
            }
        }
        *killed = chosen;
    }

    fn submerge_decision(&self, query: &RetreatQuery<'_>) -> Result<bool> {
        if query.enemy_units.is_empty() {
            return Ok(false);
        }
        for id in query.own_units {
            let t = query.world.unit_type_of(*id)?;
            if !(t.is_sea && t.is_sub) {
                return Ok(false);
            }
        }
        for id in query.enemy_units {
            let t = query.world.unit_type_of(*id)?;
            if !t.is_air || t.is_destroyer {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn retreat_decision(&self, query: &RetreatQuery<'_>) -> Result<bool> {
        if let Some(round) = self.retreat_after_round {
            if query.round >= round {
                return Ok(true);
            }
        }
        if !self.retreat_when_only_air_left
            && self.retreat_after_units_left.is_none()
            && !self.retreat_when_meta_power_is_lower
        {
            return Ok(false);
        }

        let units_left = query.own_units.len();
        if self.retreat_when_only_air_left {
            let mut air_left = 0;
            for id in query.own_units {
                if query.world.unit_type_of(*id)?.is_air {
                    air_left += 1;
                }
            }
            let allowance = self.retreat_after_units_left.unwrap_or(0);
            if air_left + allowance >= units_left {
                return Ok(true);
            }
        }
        if let Some(threshold) = self.retreat_after_units_left {
            if threshold >= units_left {
                return Ok(true);
            }
        }
        if self.retreat_when_meta_power_is_lower {
            let ours = meta_power(query.world, query.own_units, query.side)?;
            let theirs = meta_power(query.world, query.enemy_units, query.side.opponent())?;
            if ours < theirs {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl DecisionPolicy for AutomatedPlayer {
    fn select_casualties(&self, query: &CasualtyQuery<'_>) -> Result<CasualtyDetails> {
        let mut killed = query.defaults.killed.clone();
        let damaged = query.defaults.damaged.clone();

        if self.keep_one_land {
            self.keep_one_land_unit(query, &mut killed)?;
        }
        self.apply_order_of_losses(query, &mut killed);

        Ok(CasualtyDetails::new(killed, damaged))
    }

    fn retreat_query(&self, query: &RetreatQuery<'_>) -> Result<Option<LocationId>> {
        let Some(destination) = query.destinations.first().copied() else {
            return Ok(None);
        };
        let retreat = if query.submerge {
            self.submerge_decision(query)?
        } else {
            self.retreat_decision(query)?
        };
        Ok(retreat.then_some(destination))
    }

    fn should_bomb(&self, _location: LocationId) -> Result<bool> {
        Err(OddsError::Unsupported("should_bomb"))
    }

    fn bombing_target(&self, _location: LocationId, _targets: &[UnitId], _bombers: &[UnitId]) -> Result<UnitId> {
        Err(OddsError::Unsupported("bombing_target"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PlayerId;
    use crate::world::snapshot::Location;
    use crate::world::unit::{Unit, UnitType, UnitTypeCatalog};

    const SITE: LocationId = LocationId(1);

    fn world() -> WorldSnapshot {
        let catalog: UnitTypeCatalog = [
            UnitType::land("infantry", 1, 2, 3.0),
            UnitType::land("armour", 3, 3, 5.0),
            UnitType::air("fighter", 3, 4, 10.0),
            UnitType::air("bomber", 4, 1, 12.0),
            UnitType::land("submarine", 2, 1, 6.0).submarine(),
            UnitType::land("destroyer", 2, 2, 8.0).destroyer(),
        ]
        .into_iter()
        .collect();
        let mut world = WorldSnapshot::new(catalog);
        world.add_location(Location::new(SITE, "Karelia"));
        world
    }

    fn place(world: &mut WorldSnapshot, unit_type: &str, count: usize) -> Vec<UnitId> {
        let units = Unit::many(unit_type, PlayerId(1), count);
        world.insert_units(SITE, &units).unwrap();
        units.iter().map(|u| u.id).collect()
    }

    fn retreat_query<'a>(
        world: &'a WorldSnapshot,
        round: u32,
        own: &'a [UnitId],
        enemy: &'a [UnitId],
    ) -> RetreatQuery<'a> {
        RetreatQuery {
            world,
            side: Side::Attacker,
            round,
            submerge: false,
            battle_site: SITE,
            own_units: own,
            enemy_units: enemy,
            destinations: &[SITE],
        }
    }

    #[test]
    fn test_default_policy_never_retreats() {
        let mut world = world();
        let own = place(&mut world, "infantry", 1);
        let enemy = place(&mut world, "armour", 5);
        let player = AutomatedPlayer::attacker(&PolicyConfig::default(), None);
        let query = retreat_query(&world, 10, &own, &enemy);
        assert_eq!(player.retreat_query(&query).unwrap(), None);
    }

    #[test]
    fn test_retreat_after_round() {
        let mut world = world();
        let own = place(&mut world, "infantry", 3);
        let enemy = place(&mut world, "infantry", 1);
        let config = PolicyConfig {
            retreat_after_round: 2,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&config, None);
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &own, &enemy)).unwrap(), None);
        assert_eq!(player.retreat_query(&retreat_query(&world, 2, &own, &enemy)).unwrap(), Some(SITE));
    }

    #[test]
    fn test_no_destinations_means_stay() {
        let mut world = world();
        let own = place(&mut world, "infantry", 1);
        let config = PolicyConfig {
            retreat_after_round: 0,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&config, None);
        let mut query = retreat_query(&world, 3, &own, &[]);
        query.destinations = &[];
        assert_eq!(player.retreat_query(&query).unwrap(), None);
    }

    #[test]
    fn test_retreat_when_only_air_left_with_allowance() {
        let mut world = world();
        let mut own = place(&mut world, "fighter", 2);
        own.extend(place(&mut world, "armour", 1));
        let enemy = place(&mut world, "infantry", 4);

        let only_air = PolicyConfig {
            retreat_when_only_air_left: true,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&only_air, None);
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &own, &enemy)).unwrap(), None);

        let with_allowance = PolicyConfig {
            retreat_when_only_air_left: true,
            retreat_after_units_left: 1,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&with_allowance, None);
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &own, &enemy)).unwrap(), Some(SITE));
    }

    #[test]
    fn test_retreat_after_units_left() {
        let mut world = world();
        let own = place(&mut world, "infantry", 2);
        let enemy = place(&mut world, "infantry", 2);
        let config = PolicyConfig {
            retreat_after_units_left: 2,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&config, None);
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &own, &enemy)).unwrap(), Some(SITE));
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &own, &enemy[..0])).unwrap(), Some(SITE));
    }

    #[test]
    fn test_retreat_when_meta_power_is_lower() {
        let mut world = world();
        let own = place(&mut world, "infantry", 2);
        let enemy = place(&mut world, "armour", 3);
        let config = PolicyConfig {
            retreat_when_meta_power_is_lower: true,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&config, None);
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &own, &enemy)).unwrap(), Some(SITE));
        assert_eq!(player.retreat_query(&retreat_query(&world, 1, &enemy, &own)).unwrap(), None);
    }

    #[test]
    fn test_meta_power_counts_remaining_hit_points() {
        let mut world = world();
        let own = place(&mut world, "armour", 2);
        // 2 armour attacking at 3 each, one hit point apiece, 6-sided dice
        assert_eq!(meta_power(&world, &own, Side::Attacker).unwrap(), 2.0);
        world.set_hits(own[0], 1).unwrap();
        assert_eq!(meta_power(&world, &own, Side::Attacker).unwrap(), 1.0);
    }

    #[test]
    fn test_submerge_only_against_air_without_destroyer() {
        let mut world = world();
        let subs = place(&mut world, "submarine", 2);
        let planes = place(&mut world, "bomber", 2);
        let mut mixed = planes.clone();
        mixed.extend(place(&mut world, "destroyer", 1));

        let player = AutomatedPlayer::defender(&PolicyConfig::default(), None);
        let mut query = retreat_query(&world, 1, &subs, &planes);
        query.side = Side::Defender;
        query.submerge = true;
        assert_eq!(player.retreat_query(&query).unwrap(), Some(SITE));

        query.enemy_units = &mixed;
        assert_eq!(player.retreat_query(&query).unwrap(), None);

        query.enemy_units = &[];
        assert_eq!(player.retreat_query(&query).unwrap(), None);
    }

    #[test]
    fn test_defaults_pass_through() {
        let mut world = world();
        let own = place(&mut world, "infantry", 3);
        let defaults = CasualtyDetails::new(vec![own[0]], vec![]);
        let player = AutomatedPlayer::attacker(&PolicyConfig::default(), None);
        let query = CasualtyQuery {
            world: &world,
            side: Side::Attacker,
            candidates: &own,
            hits: 1,
            defaults: &defaults,
        };
        assert_eq!(player.select_casualties(&query).unwrap(), defaults);
    }

    #[test]
    fn test_keep_one_land_unit_swaps_in_cheapest_air() {
        let mut world = world();
        let infantry = place(&mut world, "infantry", 1);
        let fighter = place(&mut world, "fighter", 1);
        let bomber = place(&mut world, "bomber", 1);
        let candidates = vec![infantry[0], fighter[0], bomber[0]];
        let defaults = CasualtyDetails::new(vec![infantry[0]], vec![]);

        let config = PolicyConfig {
            keep_one_attacking_land_unit: true,
            ..Default::default()
        };
        let player = AutomatedPlayer::attacker(&config, None);
        let query = CasualtyQuery {
            world: &world,
            side: Side::Attacker,
            candidates: &candidates,
            hits: 1,
            defaults: &defaults,
        };
        let details = player.select_casualties(&query).unwrap();
        assert_eq!(details.killed, vec![fighter[0]]);
    }

    #[test]
    fn test_keep_one_land_unit_ignored_for_defender() {
        let mut world = world();
        let infantry = place(&mut world, "infantry", 1);
        let fighter = place(&mut world, "fighter", 1);
        let candidates = vec![infantry[0], fighter[0]];
        let defaults = CasualtyDetails::new(vec![infantry[0]], vec![]);

        let config = PolicyConfig {
            keep_one_attacking_land_unit: true,
            ..Default::default()
        };
        let player = AutomatedPlayer::defender(&config, None);
        let query = CasualtyQuery {
            world: &world,
            side: Side::Defender,
            candidates: &candidates,
            hits: 1,
            defaults: &defaults,
        };
        assert_eq!(player.select_casualties(&query).unwrap().killed, vec![infantry[0]]);
    }

    #[test]
    fn test_order_of_losses_overrides_defaults_and_fills_shortfall() {
        let mut world = world();
        let infantry = place(&mut world, "infantry", 2);
        let armour = place(&mut world, "armour", 2);
        let mut candidates = infantry.clone();
        candidates.extend(&armour);

        // Order only names one armour; three casualties needed
        let defaults = CasualtyDetails::new(vec![infantry[0], infantry[1], armour[0]], vec![]);
        let player = AutomatedPlayer::attacker(&PolicyConfig::default(), Some(vec![armour[1]]));
        let query = CasualtyQuery {
            world: &world,
            side: Side::Attacker,
            candidates: &candidates,
            hits: 3,
            defaults: &defaults,
        };
        let details = player.select_casualties(&query).unwrap();
        assert_eq!(details.killed, vec![armour[1], infantry[0], infantry[1]]);
    }

    #[test]
    fn test_bombing_queries_unsupported() {
        let player = AutomatedPlayer::attacker(&PolicyConfig::default(), None);
        assert!(matches!(player.should_bomb(SITE), Err(OddsError::Unsupported(_))));
        assert!(matches!(
            player.bombing_target(SITE, &[], &[]),
            Err(OddsError::Unsupported(_))
        ));
    }
}
