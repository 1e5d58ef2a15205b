//! Automated decision-making for simulated battles
//!
//! Architecture: Trait + Data hybrid
//! - DecisionPolicy trait defines the queries a combat resolver may raise
//! - AutomatedPlayer answers them from a PolicyConfig, no search involved
//! - Query structs hand the policy a read-only view of the battle

pub mod automated;
pub mod order_of_losses;

pub use automated::{meta_power, AutomatedPlayer};
pub use order_of_losses::{LossToken, OrderOfLosses, Quantity};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::{LocationId, Side, UnitId};
use crate::world::snapshot::WorldSnapshot;

/// Units chosen to absorb hits
///
/// Each entry in `damaged` is one extra hit on a multi-hit unit; ids may
/// repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtyDetails {
    pub killed: Vec<UnitId>,
    pub damaged: Vec<UnitId>,
}

impl CasualtyDetails {
    pub fn new(killed: Vec<UnitId>, damaged: Vec<UnitId>) -> Self {
        Self { killed, damaged }
    }

    /// Number of hits this selection absorbs
    pub fn hits_absorbed(&self) -> usize {
        self.killed.len() + self.damaged.len()
    }
}

/// "Pick casualties" request raised by the resolver
#[derive(Debug, Clone, Copy)]
pub struct CasualtyQuery<'a> {
    pub world: &'a WorldSnapshot,
    pub side: Side,
    /// Units eligible to be hit
    pub candidates: &'a [UnitId],
    pub hits: usize,
    /// The resolver's own suggestion
    pub defaults: &'a CasualtyDetails,
}

/// "Retreat or stay" request raised by the resolver
#[derive(Debug, Clone, Copy)]
pub struct RetreatQuery<'a> {
    pub world: &'a WorldSnapshot,
    pub side: Side,
    pub round: u32,
    /// Submarines slipping away rather than a full retreat
    pub submerge: bool,
    pub battle_site: LocationId,
    pub own_units: &'a [UnitId],
    pub enemy_units: &'a [UnitId],
    pub destinations: &'a [LocationId],
}

/// Trait for stand-in players answering a resolver's battle-time questions
pub trait DecisionPolicy: Send + Sync {
    /// Choose which units take the hits
    fn select_casualties(&self, query: &CasualtyQuery<'_>) -> Result<CasualtyDetails>;

    /// Return a destination to retreat (or submerge) to, or `None` to stay
    fn retreat_query(&self, query: &RetreatQuery<'_>) -> Result<Option<LocationId>>;

    /// Strategic bombing decision
    fn should_bomb(&self, location: LocationId) -> Result<bool>;

    /// Strategic bombing target
    fn bombing_target(&self, location: LocationId, targets: &[UnitId], bombers: &[UnitId]) -> Result<UnitId>;
}

/// One policy per side of a battle
#[derive(Clone)]
pub struct SidePolicies {
    pub attacker: Arc<dyn DecisionPolicy>,
    pub defender: Arc<dyn DecisionPolicy>,
}

impl SidePolicies {
    pub fn new(attacker: Arc<dyn DecisionPolicy>, defender: Arc<dyn DecisionPolicy>) -> Self {
        Self { attacker, defender }
    }

    pub fn for_side(&self, side: Side) -> &dyn DecisionPolicy {
        match side {
            Side::Attacker => self.attacker.as_ref(),
            Side::Defender => self.defender.as_ref(),
        }
    }
}

impl std::fmt::Debug for SidePolicies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidePolicies").finish_non_exhaustive()
    }
}
