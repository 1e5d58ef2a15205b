//! World snapshot: the isolated, mutable copy of game state a calculator
//! simulates on

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::{OddsError, Result};
use crate::core::types::{LocationId, PlayerId, UnitId};
use crate::world::unit::{Unit, UnitType, UnitTypeCatalog};

/// Default number of sides on a combat die
pub const DEFAULT_DICE_SIDES: u32 = 6;

/// First id that occurs more than once
pub(crate) fn first_duplicate(ids: impl IntoIterator<Item = UnitId>) -> Option<UnitId> {
    let mut seen = AHashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Players this one fights alongside
    #[serde(default)]
    pub allies: Vec<PlayerId>,
}

impl Player {
    pub fn new(id: PlayerId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            allies: Vec::new(),
        }
    }
}

/// A territory or sea zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(default)]
    pub is_water: bool,
    #[serde(default)]
    pub neighbors: Vec<LocationId>,
    /// Units currently here
    #[serde(default)]
    pub units: BTreeSet<UnitId>,
}

impl Location {
    pub fn new(id: LocationId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_water: false,
            neighbors: Vec::new(),
            units: BTreeSet::new(),
        }
    }

    pub fn water(id: LocationId, name: &str) -> Self {
        Self {
            is_water: true,
            ..Self::new(id, name)
        }
    }
}

/// Self-contained copy of everything combat needs
///
/// Rosters are ordered sets so that equality after a rollback does not
/// depend on the order units were re-added.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    dice_sides: u32,
    players: BTreeMap<PlayerId, Player>,
    locations: BTreeMap<LocationId, Location>,
    units: BTreeMap<UnitId, Unit>,
    catalog: UnitTypeCatalog,
}

impl Default for WorldSnapshot {
    fn default() -> Self {
        Self::new(UnitTypeCatalog::new())
    }
}

impl WorldSnapshot {
    pub fn new(catalog: UnitTypeCatalog) -> Self {
        Self {
            dice_sides: DEFAULT_DICE_SIDES,
            players: BTreeMap::new(),
            locations: BTreeMap::new(),
            units: BTreeMap::new(),
            catalog,
        }
    }

    pub fn with_dice_sides(mut self, dice_sides: u32) -> Self {
        self.dice_sides = dice_sides.max(1);
        self
    }

    pub fn dice_sides(&self) -> u32 {
        self.dice_sides
    }

    pub fn catalog(&self) -> &UnitTypeCatalog {
        &self.catalog
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn require_player(&self, id: PlayerId) -> Result<&Player> {
        self.player(id).ok_or(OddsError::UnknownPlayer(id))
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn add_location(&mut self, location: Location) {
        self.locations.insert(location.id, location);
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    pub fn require_location(&self, id: LocationId) -> Result<&Location> {
        self.location(id).ok_or(OddsError::UnknownLocation(id))
    }

    fn location_mut(&mut self, id: LocationId) -> Result<&mut Location> {
        self.locations
            .get_mut(&id)
            .ok_or(OddsError::UnknownLocation(id))
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn require_unit(&self, id: UnitId) -> Result<&Unit> {
        self.unit(id).ok_or(OddsError::UnknownUnit(id))
    }

    /// Type of a unit in this world
    pub fn unit_type_of(&self, id: UnitId) -> Result<&UnitType> {
        let unit = self.require_unit(id)?;
        self.catalog.require(&unit.unit_type)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Units present at a location, in roster order
    pub fn units_at(&self, location: LocationId) -> Vec<&Unit> {
        self.location(location)
            .map(|loc| loc.units.iter().filter_map(|id| self.units.get(id)).collect())
            .unwrap_or_default()
    }

    /// Is the unit still standing at the location?
    pub fn is_present(&self, location: LocationId, unit: UnitId) -> bool {
        self.location(location)
            .map(|loc| loc.units.contains(&unit))
            .unwrap_or(false)
    }

    /// Place units at a location
    ///
    /// Fails without modifying anything if a unit id already exists or
    /// repeats within `units`.
    pub fn insert_units(&mut self, location: LocationId, units: &[Unit]) -> Result<()> {
        self.require_location(location)?;
        if let Some(dup) = units.iter().find(|u| self.units.contains_key(&u.id)) {
            return Err(OddsError::DuplicateUnit(dup.id));
        }
        if let Some(dup) = first_duplicate(units.iter().map(|u| u.id)) {
            return Err(OddsError::DuplicateUnit(dup));
        }
        let loc = self.location_mut(location)?;
        for unit in units {
            loc.units.insert(unit.id);
        }
        for unit in units {
            self.units.insert(unit.id, unit.clone());
        }
        Ok(())
    }

    /// Remove units from a location and from the world, returning them
    ///
    /// Fails without modifying anything if any unit is not at the location
    /// or an id repeats.
    pub fn take_units(&mut self, location: LocationId, ids: &[UnitId]) -> Result<Vec<Unit>> {
        let loc = self.require_location(location)?;
        if let Some(missing) = ids.iter().find(|id| !loc.units.contains(id) || !self.units.contains_key(id)) {
            return Err(OddsError::UnknownUnit(*missing));
        }
        if let Some(dup) = first_duplicate(ids.iter().copied()) {
            return Err(OddsError::DuplicateUnit(dup));
        }
        let loc = self.location_mut(location)?;
        for id in ids {
            loc.units.remove(id);
        }
        ids.iter()
            .map(|id| self.units.remove(id).ok_or(OddsError::UnknownUnit(*id)))
            .collect()
    }

    /// Overwrite the hit counter of a unit
    pub fn set_hits(&mut self, id: UnitId, hits: u32) -> Result<()> {
        let unit = self.units.get_mut(&id).ok_or(OddsError::UnknownUnit(id))?;
        unit.hits = hits;
        Ok(())
    }

    /// Register a unit that takes part in combat from elsewhere (bombarding
    /// ships) without placing it on any roster
    pub fn register_detached(&mut self, unit: Unit) {
        self.detach(unit.id);
        self.units.insert(unit.id, unit);
    }

    /// Remove a unit id from every roster it appears on
    pub fn detach(&mut self, id: UnitId) {
        for location in self.locations.values_mut() {
            location.units.remove(&id);
        }
    }

    /// Clear a location and install the given forces there
    ///
    /// Pre-existing occupants are removed from the world entirely; supplied
    /// units are pulled off any other roster first.
    pub fn install_forces(&mut self, location: LocationId, forces: &[Unit]) -> Result<()> {
        if let Some(dup) = first_duplicate(forces.iter().map(|u| u.id)) {
            return Err(OddsError::DuplicateUnit(dup));
        }
        let previous: Vec<UnitId> = self.require_location(location)?.units.iter().copied().collect();
        self.take_units(location, &previous)?;
        for unit in forces {
            self.detach(unit.id);
            self.units.remove(&unit.id);
        }
        self.insert_units(location, forces)
    }
}
