//! The resolver's only window onto the world

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::core::error::Result;
use crate::core::types::Side;
use crate::policy::{DecisionPolicy, SidePolicies};
use crate::world::change::{Change, ChangeScope};
use crate::world::snapshot::WorldSnapshot;

/// Services a resolver may call while playing a battle
pub trait BattleBridge {
    /// Current state of the snapshot, including changes made so far
    fn world(&self) -> &WorldSnapshot;

    /// Apply a change immediately and record it for rollback
    fn add_change(&mut self, change: Change) -> Result<()>;

    /// Uniform draw in `[0, max)`; `annotation` names the roll for tracing
    fn random(&mut self, max: u32, annotation: &str) -> u32;

    /// Several independent draws in `[0, max)`
    fn random_many(&mut self, max: u32, count: usize, annotation: &str) -> Vec<u32> {
        (0..count).map(|_| self.random(max, annotation)).collect()
    }

    /// Stand-in player for one side
    fn policy(&self, side: Side) -> &dyn DecisionPolicy;
}

/// Bridge used by repetitions: changes go to a [`ChangeScope`], draws to a
/// seeded stream
pub struct SimulationBridge<'w, 'r> {
    scope: ChangeScope<'w>,
    rng: &'r mut ChaCha8Rng,
    policies: &'r SidePolicies,
}

impl<'w, 'r> SimulationBridge<'w, 'r> {
    pub fn new(world: &'w mut WorldSnapshot, rng: &'r mut ChaCha8Rng, policies: &'r SidePolicies) -> Self {
        Self {
            scope: ChangeScope::open(world),
            rng,
            policies,
        }
    }

    /// Number of changes applied so far
    pub fn change_count(&self) -> usize {
        self.scope.record().len()
    }

    /// Undo everything this bridge applied
    pub fn rollback(self) -> Result<()> {
        self.scope.rollback()
    }
}

impl BattleBridge for SimulationBridge<'_, '_> {
    fn world(&self) -> &WorldSnapshot {
        self.scope.world()
    }

    fn add_change(&mut self, change: Change) -> Result<()> {
        self.scope.perform(change)
    }

    fn random(&mut self, max: u32, annotation: &str) -> u32 {
        if max == 0 {
            return 0;
        }
        let roll = self.rng.gen_range(0..max);
        tracing::trace!("{}: rolled {} of {}", annotation, roll, max);
        roll
    }

    fn policy(&self, side: Side) -> &dyn DecisionPolicy {
        self.policies.for_side(side)
    }
}
