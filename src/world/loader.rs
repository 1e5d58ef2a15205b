//! Load battle scenarios from TOML files
//!
//! A scenario bundles a small world (unit types, players, locations), the
//! forces on each side and, optionally, calculator settings. The runner uses
//! it as a stand-in for a live game.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::battle::resolver::{BattleRequest, TerrainEffect};
use crate::core::config::CalculatorConfig;
use crate::core::error::{OddsError, Result};
use crate::core::types::{LocationId, PlayerId};
use crate::world::snapshot::{Location, Player, WorldSnapshot, DEFAULT_DICE_SIDES};
use crate::world::unit::{Unit, UnitType, UnitTypeCatalog};

/// Root structure of a scenario file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioFile {
    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_dice_sides")]
    pub dice_sides: u32,
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub location: LocationId,
    pub unit_types: Vec<UnitType>,
    pub players: Vec<Player>,
    pub locations: Vec<Location>,
    #[serde(default)]
    pub attacking: Vec<ForceEntry>,
    #[serde(default)]
    pub defending: Vec<ForceEntry>,
    #[serde(default)]
    pub bombarding: Vec<ForceEntry>,
    #[serde(default)]
    pub terrain_effects: Vec<TerrainEffect>,
    /// Calculator settings shipped with the scenario
    #[serde(default)]
    pub calculator: Option<CalculatorConfig>,
}

fn default_dice_sides() -> u32 {
    DEFAULT_DICE_SIDES
}

/// `count` units of one type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForceEntry {
    pub unit_type: String,
    #[serde(default = "default_count")]
    pub count: usize,
    /// Defaults to the side's player
    #[serde(default)]
    pub owner: Option<PlayerId>,
}

fn default_count() -> usize {
    1
}

/// A loaded scenario, ready to hand to a calculator
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub world: WorldSnapshot,
    pub request: BattleRequest,
    pub config: Option<CalculatorConfig>,
}

/// Builds [`Scenario`]s from TOML
#[derive(Debug, Default)]
pub struct ScenarioLoader;

impl ScenarioLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load_from_toml(&self, text: &str) -> Result<Scenario> {
        let file: ScenarioFile = toml::from_str(text)?;
        self.build(file)
    }

    pub fn load_from_file(&self, path: &Path) -> Result<Scenario> {
        let content = fs::read_to_string(path)?;
        let mut scenario = self.load_from_toml(&content)?;
        if scenario.name.is_empty() {
            scenario.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(scenario)
    }

    fn build(&self, file: ScenarioFile) -> Result<Scenario> {
        if file.dice_sides == 0 {
            return Err(OddsError::InvalidConfig("dice_sides must be at least 1".into()));
        }
        if let Some(config) = &file.calculator {
            config.validate()?;
        }

        let catalog: UnitTypeCatalog = file.unit_types.into_iter().collect();
        let mut world = WorldSnapshot::new(catalog).with_dice_sides(file.dice_sides);
        for player in file.players {
            world.add_player(player);
        }
        for location in file.locations {
            world.add_location(location);
        }
        world.require_player(file.attacker)?;
        world.require_player(file.defender)?;
        world.require_location(file.location)?;

        let attacking = expand(&world, &file.attacking, file.attacker)?;
        let defending = expand(&world, &file.defending, file.defender)?;
        let bombarding = expand(&world, &file.bombarding, file.attacker)?;

        let request = BattleRequest {
            attacker: file.attacker,
            defender: file.defender,
            location: file.location,
            attacking,
            defending,
            bombarding,
            terrain_effects: file.terrain_effects,
        };

        tracing::debug!(
            "Loaded scenario {:?}: {} attacking, {} defending",
            file.name,
            request.attacking.len(),
            request.defending.len()
        );

        Ok(Scenario {
            name: file.name.unwrap_or_default(),
            world,
            request,
            config: file.calculator,
        })
    }
}

/// Turn force entries into fresh units
fn expand(world: &WorldSnapshot, entries: &[ForceEntry], side_owner: PlayerId) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    for entry in entries {
        world.catalog().require(&entry.unit_type)?;
        let owner = entry.owner.unwrap_or(side_owner);
        world.require_player(owner)?;
        units.extend(Unit::many(&entry.unit_type, owner, entry.count));
    }
    Ok(units)
}
