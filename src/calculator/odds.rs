//! The odds calculator
//!
//! Lifecycle:
//! 1. `set_world_state` binds a private copy of the world
//! 2. `configure` installs the forces at the battle location
//! 3. `calculate` runs the repetitions and aggregates them
//!
//! `calculate` takes `&self` and the setters take `&mut self`, so the world
//! cannot be rebound while a calculation is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::battle::dice::StandardDiceResolver;
use crate::battle::resolver::{BattleRequest, BattleSetup, CombatResolver};
use crate::calculator::aggregate::AggregateResult;
use crate::calculator::scheduler::{lock_snapshot, run_repetitions, Schedule, WorkerContext};
use crate::core::config::{validate_run_count, CalculatorConfig, PolicyConfig};
use crate::core::error::{OddsError, Result};
use crate::core::types::Side;
use crate::policy::{AutomatedPlayer, OrderOfLosses, SidePolicies};
use crate::world::snapshot::{first_duplicate, WorldSnapshot};
use crate::world::unit::Unit;

/// Cloneable handle that stops a running calculation from any thread
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request a stop; repeated calls are harmless
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Clears the cancel flag when `calculate` returns
struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A configured battle, ready to simulate
struct PreparedBattle {
    setup: Arc<BattleSetup>,
    policies: SidePolicies,
    initial_attackers: Vec<Unit>,
    initial_defenders: Vec<Unit>,
}

/// Estimates battle outcomes by repeated simulation
pub struct OddsCalculator {
    config: CalculatorConfig,
    resolver: Arc<dyn CombatResolver>,
    snapshot: Option<Arc<Mutex<WorldSnapshot>>>,
    battle: Option<PreparedBattle>,
    attacker_order: Option<OrderOfLosses>,
    defender_order: Option<OrderOfLosses>,
    cancel: Arc<AtomicBool>,
}

impl Default for OddsCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OddsCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OddsCalculator")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl OddsCalculator {
    /// Calculator with default settings and the standard dice resolver
    pub fn new() -> Self {
        Self {
            config: CalculatorConfig::default(),
            resolver: Arc::new(StandardDiceResolver::new()),
            snapshot: None,
            battle: None,
            attacker_order: None,
            defender_order: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(config: CalculatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Replace the combat resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn CombatResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.battle.is_some()
    }

    /// Bind a private copy of `world`, discarding any battle configuration
    pub fn set_world_state(&mut self, world: &WorldSnapshot) {
        self.snapshot = Some(Arc::new(Mutex::new(world.clone())));
        self.battle = None;
        self.attacker_order = None;
        self.defender_order = None;
        tracing::debug!("Bound world snapshot with {} units", world.unit_count());
    }

    /// Copy of the bound snapshot as it currently stands
    pub fn world_snapshot(&self) -> Option<WorldSnapshot> {
        self.snapshot.as_ref().map(|s| lock_snapshot(s).clone())
    }

    /// Replace the automated player rules; applies from the next `configure`
    pub fn set_policy(&mut self, policy: PolicyConfig) -> Result<()> {
        policy.validate()?;
        self.config.policy = policy;
        Ok(())
    }

    /// Set or clear a side's order of losses
    ///
    /// Checked against the bound catalog now; applies from the next
    /// `configure`.
    pub fn set_order_of_losses(&mut self, side: Side, order: Option<&str>) -> Result<()> {
        let snapshot = self.snapshot.as_ref().ok_or(OddsError::NotReady)?;
        let parsed = OrderOfLosses::parse_optional(order, lock_snapshot(snapshot).catalog())?;
        match side {
            Side::Attacker => self.attacker_order = parsed,
            Side::Defender => self.defender_order = parsed,
        }
        Ok(())
    }

    fn order_for(&self, side: Side, world: &WorldSnapshot) -> Result<Option<OrderOfLosses>> {
        let (explicit, configured) = match side {
            Side::Attacker => (&self.attacker_order, &self.config.policy.attacker_order_of_losses),
            Side::Defender => (&self.defender_order, &self.config.policy.defender_order_of_losses),
        };
        match explicit {
            Some(order) => Ok(Some(order.clone())),
            None => OrderOfLosses::parse_optional(configured.as_deref(), world.catalog()),
        }
    }

    /// Install the forces of a battle and prepare `run_count` repetitions
    pub fn configure(&mut self, request: BattleRequest, run_count: u32) -> Result<()> {
        let snapshot = self.snapshot.clone().ok_or(OddsError::NotReady)?;
        validate_run_count(run_count)?;
        let mut world = lock_snapshot(&snapshot);

        world.require_player(request.attacker)?;
        world.require_player(request.defender)?;
        world.require_location(request.location)?;
        for unit in request.all_units() {
            world.catalog().require(&unit.unit_type)?;
        }
        // A unit may fight on one side only, and only once
        if let Some(dup) = first_duplicate(request.all_units().map(|u| u.id)) {
            return Err(OddsError::DuplicateUnit(dup));
        }
        let attacker_order = self.order_for(Side::Attacker, &world)?;
        let defender_order = self.order_for(Side::Defender, &world)?;

        let mut forces = request.attacking.clone();
        forces.extend(request.defending.iter().cloned());
        world.install_forces(request.location, &forces)?;
        for unit in &request.bombarding {
            world.register_detached(unit.clone());
        }
        drop(world);

        let policy = &self.config.policy;
        let policies = SidePolicies::new(
            Arc::new(AutomatedPlayer::attacker(
                policy,
                attacker_order.map(|o| o.resolve(&request.attacking)),
            )),
            Arc::new(AutomatedPlayer::defender(
                policy,
                defender_order.map(|o| o.resolve(&request.defending)),
            )),
        );
        let ids = |units: &[Unit]| units.iter().map(|u| u.id).collect::<Vec<_>>();
        let setup = BattleSetup {
            attacker: request.attacker,
            defender: request.defender,
            location: request.location,
            attacking: ids(&request.attacking),
            defending: ids(&request.defending),
            bombarding: ids(&request.bombarding),
            terrain_effects: request.terrain_effects,
            amphibious: self.config.amphibious,
            max_rounds: self.config.max_rounds,
        };

        tracing::debug!(
            "Configured battle at {}: {} attacking, {} defending, {} bombarding, {} runs",
            setup.location,
            setup.attacking.len(),
            setup.defending.len(),
            setup.bombarding.len(),
            run_count
        );

        self.config.run_count = run_count;
        self.battle = Some(PreparedBattle {
            setup: Arc::new(setup),
            policies,
            initial_attackers: request.attacking,
            initial_defenders: request.defending,
        });
        Ok(())
    }

    /// Run the configured repetitions and aggregate them
    ///
    /// Blocks until every repetition finished, the calculation was cancelled,
    /// or a deadline passed. Partial results are returned in the latter cases.
    pub fn calculate(&self) -> Result<AggregateResult> {
        let snapshot = self.snapshot.as_ref().ok_or(OddsError::NotReady)?;
        let battle = self.battle.as_ref().ok_or(OddsError::NotConfigured)?;
        // Only cancels raised during this calculation count
        self.cancel.store(false, Ordering::Release);
        let _reset = ResetOnDrop(&self.cancel);

        let runs = self.config.run_count;
        let threads = self.config.effective_threads(runs);
        let started = Instant::now();
        tracing::debug!("Starting calculation: {} runs on {} threads", runs, threads);

        let ctx = WorkerContext {
            snapshot: snapshot.clone(),
            battle: battle.setup.clone(),
            policies: battle.policies.clone(),
            resolver: self.resolver.clone(),
            seed: self.config.seed,
            mode: self.config.snapshot_mode,
            cancel: self.cancel.clone(),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let schedule = Schedule {
            runs,
            threads,
            shutdown_timeout: self.config.shutdown_timeout(),
            time_limit: self.config.time_limit(),
        };
        let collected = run_repetitions(ctx, schedule)?;

        let elapsed = started.elapsed();
        tracing::debug!(
            "Calculation finished: {} completed, {} dropped in {:?}",
            collected.results.len(),
            collected.dropped,
            elapsed
        );

        Ok(AggregateResult::new(
            collected.results,
            battle.initial_attackers.clone(),
            battle.initial_defenders.clone(),
        )
        .with_dropped(collected.dropped)
        .with_elapsed(elapsed)
        .with_cancelled(collected.cancelled))
    }

    /// `configure` followed by `calculate`
    pub fn configure_and_calculate(&mut self, request: BattleRequest, run_count: u32) -> Result<AggregateResult> {
        self.configure(request, run_count)?;
        self.calculate()
    }

    /// Stop the running calculation, if any
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{LocationId, PlayerId};
    use crate::world::snapshot::{Location, Player};
    use crate::world::unit::{UnitType, UnitTypeCatalog};

    fn world() -> WorldSnapshot {
        let catalog: UnitTypeCatalog = [UnitType::land("infantry", 2, 2, 3.0), UnitType::air("fighter", 3, 4, 10.0)]
            .into_iter()
            .collect();
        let mut world = WorldSnapshot::new(catalog);
        world.add_player(Player::new(PlayerId(1), "Japan"));
        world.add_player(Player::new(PlayerId(2), "China"));
        world.add_location(Location::new(LocationId(1), "Kwangtung"));
        world
    }

    fn request() -> BattleRequest {
        BattleRequest::new(PlayerId(1), PlayerId(2), LocationId(1))
            .with_attacking(Unit::many("infantry", PlayerId(1), 3))
            .with_defending(Unit::many("infantry", PlayerId(2), 2))
    }

    #[test]
    fn test_configure_requires_world() {
        let mut calc = OddsCalculator::new();
        assert!(matches!(calc.configure(request(), 10), Err(OddsError::NotReady)));
        assert!(matches!(calc.calculate(), Err(OddsError::NotReady)));
    }

    #[test]
    fn test_calculate_requires_configure() {
        let mut calc = OddsCalculator::new();
        calc.set_world_state(&world());
        assert!(matches!(calc.calculate(), Err(OddsError::NotConfigured)));
    }

    #[test]
    fn test_configure_rejects_unknown_references() {
        let mut calc = OddsCalculator::new();
        calc.set_world_state(&world());

        let mut bad = request();
        bad.location = LocationId(9);
        assert!(matches!(calc.configure(bad, 10), Err(OddsError::UnknownLocation(_))));

        let mut bad = request();
        bad.defender = PlayerId(9);
        assert!(matches!(calc.configure(bad, 10), Err(OddsError::UnknownPlayer(_))));

        let bad = request().with_bombarding(Unit::many("cruiser", PlayerId(1), 1));
        assert!(matches!(calc.configure(bad, 10), Err(OddsError::UnknownUnitType(_))));

        assert!(matches!(calc.configure(request(), 20_001), Err(OddsError::InvalidConfig(_))));
        assert!(!calc.is_configured());
    }

    #[test]
    fn test_configure_installs_forces() {
        let mut world = world();
        let squatters = Unit::many("fighter", PlayerId(2), 2);
        world.insert_units(LocationId(1), &squatters).unwrap();

        let mut calc = OddsCalculator::new();
        calc.set_world_state(&world);
        let request = request();
        calc.configure(request.clone(), 10).unwrap();

        let snapshot = calc.world_snapshot().unwrap();
        let here: Vec<_> = snapshot.units_at(LocationId(1)).into_iter().cloned().collect();
        assert_eq!(here.len(), 5);
        assert!(squatters.iter().all(|u| snapshot.unit(u.id).is_none()));
        assert!(request.attacking.iter().all(|u| here.contains(u)));
    }

    #[test]
    fn test_configure_rejects_repeated_units() {
        let mut calc = OddsCalculator::new();
        let world = world();
        calc.set_world_state(&world);

        let turncoat = Unit::new("infantry", PlayerId(1));
        let both_sides = request()
            .with_attacking(vec![turncoat.clone()])
            .with_defending(vec![turncoat.clone()]);
        assert!(matches!(
            calc.configure(both_sides, 50),
            Err(OddsError::DuplicateUnit(id)) if id == turncoat.id
        ));

        let twice = request().with_attacking(vec![turncoat.clone(), turncoat.clone()]);
        assert!(matches!(calc.configure(twice, 50), Err(OddsError::DuplicateUnit(_))));

        let mut request = request();
        request.bombarding.push(request.attacking[0].clone());
        assert!(matches!(calc.configure(request, 50), Err(OddsError::DuplicateUnit(_))));

        assert!(!calc.is_configured());
        assert_eq!(calc.world_snapshot().unwrap(), world);
    }

    #[test]
    fn test_rebinding_resets_configuration() {
        let mut calc = OddsCalculator::new();
        calc.set_world_state(&world());
        calc.set_order_of_losses(Side::Attacker, Some("*^infantry")).unwrap();
        calc.configure(request(), 10).unwrap();
        assert!(calc.is_configured());

        calc.set_world_state(&world());
        assert!(!calc.is_configured());
        assert!(calc.attacker_order.is_none());
    }

    #[test]
    fn test_order_of_losses_validated_against_catalog() {
        let mut calc = OddsCalculator::new();
        assert!(matches!(
            calc.set_order_of_losses(Side::Defender, Some("1^infantry")),
            Err(OddsError::NotReady)
        ));
        calc.set_world_state(&world());
        assert!(matches!(
            calc.set_order_of_losses(Side::Defender, Some("1^tank")),
            Err(OddsError::InvalidCasualtyOrder { .. })
        ));
        calc.set_order_of_losses(Side::Defender, Some("1^infantry;*^fighter")).unwrap();
    }

    #[test]
    fn test_configured_order_string_checked_at_configure() {
        let mut config = CalculatorConfig::default();
        config.policy.attacker_order_of_losses = Some("2^zeppelin".into());
        let mut calc = OddsCalculator::with_config(config).unwrap();
        let world = world();
        calc.set_world_state(&world);
        assert!(matches!(
            calc.configure(request(), 10),
            Err(OddsError::InvalidCasualtyOrder { .. })
        ));
        assert_eq!(calc.world_snapshot().unwrap(), world);
    }

    #[test]
    fn test_zero_runs_gives_empty_aggregate() {
        let mut calc = OddsCalculator::new();
        calc.set_world_state(&world());
        let aggregate = calc.configure_and_calculate(request(), 0).unwrap();
        assert_eq!(aggregate.repetitions(), 0);
        assert_eq!(aggregate.win_percent(Side::Attacker), 0.0);
        assert_eq!(aggregate.average_rounds_fought(), 1.0);
        assert!(aggregate.closest_to_average().is_none());
    }

    #[test]
    fn test_cancel_between_calculations_is_ignored() {
        let mut calc = OddsCalculator::new();
        calc.set_world_state(&world());
        calc.configure(request(), 50).unwrap();

        let handle = calc.cancel_handle();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        let aggregate = calc.calculate().unwrap();
        assert_eq!(aggregate.repetitions(), 50);
        assert!(!aggregate.was_cancelled());
        assert!(!handle.is_cancelled());
    }
}
