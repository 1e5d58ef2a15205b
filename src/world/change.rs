//! Reversible world changes
//!
//! Every mutation made during a repetition goes through a [`Change`]. A
//! [`ChangeRecord`] keeps the applied changes in order and can undo them, and
//! a [`ChangeScope`] ties a record to a snapshot so that undo happens no matter
//! how the repetition ends.

use serde::{Deserialize, Serialize};

use crate::core::error::{OddsError, Result};
use crate::core::types::{LocationId, UnitId};
use crate::world::snapshot::{first_duplicate, WorldSnapshot};
use crate::world::unit::Unit;

/// Hit counter transition for one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitUpdate {
    pub unit: UnitId,
    pub from: u32,
    pub to: u32,
}

/// One atomic mutation of a world snapshot
///
/// Removals carry full unit copies so their inverse can restore them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    AddUnits { location: LocationId, units: Vec<Unit> },
    RemoveUnits { location: LocationId, units: Vec<Unit> },
    UnitHits { updates: Vec<HitUpdate> },
}

impl Change {
    /// Removal of units currently in the snapshot; each id at most once
    pub fn remove_units(world: &WorldSnapshot, location: LocationId, ids: &[UnitId]) -> Result<Change> {
        if let Some(dup) = first_duplicate(ids.iter().copied()) {
            return Err(OddsError::DuplicateUnit(dup));
        }
        let units = ids
            .iter()
            .map(|id| world.require_unit(*id).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Change::RemoveUnits { location, units })
    }

    /// Add `extra` hits to each listed unit (ids may repeat)
    pub fn add_hits(world: &WorldSnapshot, ids: &[UnitId]) -> Result<Change> {
        let mut updates: Vec<HitUpdate> = Vec::new();
        for id in ids {
            match updates.iter_mut().find(|u| u.unit == *id) {
                Some(update) => update.to += 1,
                None => {
                    let from = world.require_unit(*id)?.hits;
                    updates.push(HitUpdate { unit: *id, from, to: from + 1 });
                }
            }
        }
        Ok(Change::UnitHits { updates })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Change::AddUnits { units, .. } | Change::RemoveUnits { units, .. } => units.is_empty(),
            Change::UnitHits { updates } => updates.is_empty(),
        }
    }

    /// Apply to a snapshot; on error the snapshot is unchanged
    pub fn apply(&self, world: &mut WorldSnapshot) -> Result<()> {
        match self {
            Change::AddUnits { location, units } => world.insert_units(*location, units),
            Change::RemoveUnits { location, units } => {
                let ids: Vec<UnitId> = units.iter().map(|u| u.id).collect();
                world.take_units(*location, &ids).map(|_| ())
            }
            Change::UnitHits { updates } => {
                if let Some(dup) = first_duplicate(updates.iter().map(|u| u.unit)) {
                    return Err(OddsError::DuplicateUnit(dup));
                }
                for update in updates {
                    world.require_unit(update.unit)?;
                }
                for update in updates {
                    world.set_hits(update.unit, update.to)?;
                }
                Ok(())
            }
        }
    }

    /// The change that undoes this one
    pub fn invert(&self) -> Change {
        match self {
            Change::AddUnits { location, units } => Change::RemoveUnits {
                location: *location,
                units: units.clone(),
            },
            Change::RemoveUnits { location, units } => Change::AddUnits {
                location: *location,
                units: units.clone(),
            },
            Change::UnitHits { updates } => Change::UnitHits {
                updates: updates
                    .iter()
                    .map(|u| HitUpdate { unit: u.unit, from: u.to, to: u.from })
                    .collect(),
            },
        }
    }
}

/// Ordered log of the changes applied during one repetition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeRecord {
    changes: Vec<Change>,
}

impl ChangeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change and log it; failed changes are not logged
    pub fn perform(&mut self, world: &mut WorldSnapshot, change: Change) -> Result<()> {
        if change.is_empty() {
            return Ok(());
        }
        change.apply(world)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Undo every logged change, newest first, leaving the record empty
    pub fn rollback(&mut self, world: &mut WorldSnapshot) -> Result<()> {
        while let Some(change) = self.changes.pop() {
            change.invert().apply(world)?;
        }
        Ok(())
    }
}

/// A change record bound to the snapshot it modifies
///
/// Dropping the scope rolls the snapshot back. Call [`ChangeScope::rollback`]
/// to observe rollback errors instead of having them logged.
pub struct ChangeScope<'a> {
    world: &'a mut WorldSnapshot,
    record: ChangeRecord,
}

impl<'a> ChangeScope<'a> {
    pub fn open(world: &'a mut WorldSnapshot) -> Self {
        Self {
            world,
            record: ChangeRecord::new(),
        }
    }

    pub fn world(&self) -> &WorldSnapshot {
        &*self.world
    }

    pub fn perform(&mut self, change: Change) -> Result<()> {
        self.record.perform(self.world, change)
    }

    pub fn record(&self) -> &ChangeRecord {
        &self.record
    }

    pub fn rollback(mut self) -> Result<()> {
        self.record.rollback(self.world)
    }
}

impl Drop for ChangeScope<'_> {
    fn drop(&mut self) {
        if self.record.is_empty() {
            return;
        }
        if let Err(e) = self.record.rollback(self.world) {
            tracing::error!("Failed to restore snapshot after repetition: {}", e);
        }
    }
}
