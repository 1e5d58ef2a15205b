//! Unit types, the type catalog, and unit instances
//!
//! Combat flags live on the type; an instance only carries identity,
//! ownership and accumulated hits.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::error::{OddsError, Result};
use crate::core::types::{PlayerId, Side, UnitId};

/// Static properties of a kind of unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitType {
    pub name: String,
    /// Strength when attacking (hits on a roll below this value)
    pub attack: u32,
    /// Strength when defending
    pub defense: u32,
    #[serde(default = "default_hit_points")]
    pub hit_points: u32,
    /// Relative value, used for value-swing statistics
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub is_air: bool,
    #[serde(default)]
    pub is_sea: bool,
    #[serde(default)]
    pub is_sub: bool,
    #[serde(default)]
    pub is_destroyer: bool,
    #[serde(default)]
    pub transport_capacity: u32,
}

fn default_hit_points() -> u32 {
    1
}

impl UnitType {
    /// A plain land unit with one hit point
    pub fn land(name: &str, attack: u32, defense: u32, cost: f64) -> Self {
        Self {
            name: name.to_string(),
            attack,
            defense,
            hit_points: 1,
            cost,
            is_air: false,
            is_sea: false,
            is_sub: false,
            is_destroyer: false,
            transport_capacity: 0,
        }
    }

    pub fn air(name: &str, attack: u32, defense: u32, cost: f64) -> Self {
        Self {
            is_air: true,
            ..Self::land(name, attack, defense, cost)
        }
    }

    pub fn sea(name: &str, attack: u32, defense: u32, cost: f64) -> Self {
        Self {
            is_sea: true,
            ..Self::land(name, attack, defense, cost)
        }
    }

    pub fn with_hit_points(mut self, hit_points: u32) -> Self {
        self.hit_points = hit_points.max(1);
        self
    }

    pub fn submarine(mut self) -> Self {
        self.is_sea = true;
        self.is_sub = true;
        self
    }

    pub fn destroyer(mut self) -> Self {
        self.is_sea = true;
        self.is_destroyer = true;
        self
    }

    pub fn is_land(&self) -> bool {
        !self.is_air && !self.is_sea
    }

    /// Strength used by the given side
    pub fn strength(&self, side: Side) -> u32 {
        match side {
            Side::Attacker => self.attack,
            Side::Defender => self.defense,
        }
    }
}

/// All unit types known to a world, looked up by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitTypeCatalog {
    types: AHashMap<String, UnitType>,
}

impl UnitTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unit_type: UnitType) {
        self.types.insert(unit_type.name.clone(), unit_type);
    }

    pub fn get(&self, name: &str) -> Option<&UnitType> {
        self.types.get(name)
    }

    /// Look up a type, failing with `UnknownUnitType`
    pub fn require(&self, name: &str) -> Result<&UnitType> {
        self.get(name)
            .ok_or_else(|| OddsError::UnknownUnitType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitType> {
        self.types.values()
    }
}

impl FromIterator<UnitType> for UnitTypeCatalog {
    fn from_iter<I: IntoIterator<Item = UnitType>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for unit_type in iter {
            catalog.insert(unit_type);
        }
        catalog
    }
}

/// One unit instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub unit_type: String,
    pub owner: PlayerId,
    /// Hits taken so far; the unit dies when this reaches its hit points
    #[serde(default)]
    pub hits: u32,
}

impl Unit {
    pub fn new(unit_type: &str, owner: PlayerId) -> Self {
        Self {
            id: UnitId::new(),
            unit_type: unit_type.to_string(),
            owner,
            hits: 0,
        }
    }

    /// Create `count` fresh units of one type
    pub fn many(unit_type: &str, owner: PlayerId, count: usize) -> Vec<Unit> {
        (0..count).map(|_| Unit::new(unit_type, owner)).collect()
    }
}

/// Maps a unit type to its relative value
pub trait UnitCostModel {
    fn unit_cost(&self, unit_type: &str) -> f64;

    /// Total value of a group of units
    fn total_cost(&self, units: &[Unit]) -> f64 {
        units.iter().map(|u| self.unit_cost(&u.unit_type)).sum()
    }
}

impl UnitCostModel for UnitTypeCatalog {
    fn unit_cost(&self, unit_type: &str) -> f64 {
        self.get(unit_type).map(|t| t.cost).unwrap_or(0.0)
    }
}

impl UnitCostModel for HashMap<String, f64> {
    fn unit_cost(&self, unit_type: &str) -> f64 {
        self.get(unit_type).copied().unwrap_or(0.0)
    }
}

impl UnitCostModel for AHashMap<String, f64> {
    fn unit_cost(&self, unit_type: &str) -> f64 {
        self.get(unit_type).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> UnitTypeCatalog {
        [
            UnitType::land("infantry", 1, 2, 3.0),
            UnitType::air("fighter", 3, 4, 10.0),
            UnitType::sea("battleship", 4, 4, 20.0).with_hit_points(2),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("fighter"));
        assert!(catalog.require("tank").is_err());
        assert_eq!(catalog.require("battleship").unwrap().hit_points, 2);
    }

    #[test]
    fn test_land_classification() {
        let catalog = catalog();
        assert!(catalog.get("infantry").unwrap().is_land());
        assert!(!catalog.get("fighter").unwrap().is_land());
        assert!(!catalog.get("battleship").unwrap().is_land());
    }

    #[test]
    fn test_strength_by_side() {
        let infantry = UnitType::land("infantry", 1, 2, 3.0);
        assert_eq!(infantry.strength(Side::Attacker), 1);
        assert_eq!(infantry.strength(Side::Defender), 2);
    }

    #[test]
    fn test_cost_models_agree() {
        let catalog = catalog();
        let mut table = HashMap::new();
        table.insert("infantry".to_string(), 3.0);
        table.insert("fighter".to_string(), 10.0);

        let mut units = Unit::many("infantry", PlayerId(1), 2);
        units.push(Unit::new("fighter", PlayerId(1)));

        assert_eq!(catalog.total_cost(&units), 16.0);
        assert_eq!(table.total_cost(&units), 16.0);
        assert_eq!(table.unit_cost("unknown"), 0.0);
    }

    #[test]
    fn test_submarine_builder_sets_sea() {
        let sub = UnitType::land("submarine", 2, 1, 6.0).submarine();
        assert!(sub.is_sea && sub.is_sub);
        assert!(!sub.is_land());
    }
}
