//! Calculator configuration with documented constants
//!
//! Every tunable of a calculation lives here. Configs are plain values: they
//! are built (or loaded from TOML) once and then handed to the calculator.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{OddsError, Result};

/// Upper bound on repetitions per calculation
pub const MAX_RUN_COUNT: u32 = 20_000;

/// Default ceiling on waiting for in-flight repetitions after a stop request
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 15_000;

/// Default round limit before a battle is scored as a draw
pub const DEFAULT_MAX_ROUNDS: u32 = 100;

/// How repetitions get access to the world snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// One snapshot, locked for the whole apply/simulate/revert window of
    /// each repetition
    #[default]
    Shared,
    /// Each worker clones the snapshot once and runs without locking
    PerWorker,
}

/// Rules for the automated players that stand in for the humans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Attacker retreats once the battle round reaches this value
    ///
    /// Negative = never. Also applies to the defender's (rare) retreat queries.
    pub retreat_after_round: i32,

    /// Attacker retreats when this many units or fewer are left
    ///
    /// Negative = never. Combined with `retreat_when_only_air_left` it acts as
    /// the number of non-air units tolerated before retreating.
    pub retreat_after_units_left: i32,

    /// Attacker retreats once only air units (plus the units-left allowance)
    /// remain
    pub retreat_when_only_air_left: bool,

    /// Attacker retreats when its meta power drops below the defender's
    pub retreat_when_meta_power_is_lower: bool,

    /// Never take the attacker's last land unit while a non-land unit could
    /// be taken instead
    pub keep_one_attacking_land_unit: bool,

    /// Order of losses for the attacker, e.g. `"*^infantry;1^artillery"`
    pub attacker_order_of_losses: Option<String>,

    /// Order of losses for the defender
    pub defender_order_of_losses: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            retreat_after_round: -1,
            retreat_after_units_left: -1,
            retreat_when_only_air_left: false,
            retreat_when_meta_power_is_lower: false,
            keep_one_attacking_land_unit: false,
            attacker_order_of_losses: None,
            defender_order_of_losses: None,
        }
    }
}

impl PolicyConfig {
    /// Round threshold, if retreating by round is enabled
    pub fn retreat_round(&self) -> Option<u32> {
        u32::try_from(self.retreat_after_round).ok()
    }

    /// Units-left threshold, if retreating by unit count is enabled
    pub fn retreat_units_left(&self) -> Option<usize> {
        usize::try_from(self.retreat_after_units_left).ok()
    }

    pub fn validate(&self) -> Result<()> {
        if self.retreat_after_round < -1 {
            return Err(OddsError::InvalidConfig(format!(
                "retreat_after_round ({}) must be -1 (never) or >= 0",
                self.retreat_after_round
            )));
        }
        if self.retreat_after_units_left < -1 {
            return Err(OddsError::InvalidConfig(format!(
                "retreat_after_units_left ({}) must be -1 (never) or >= 0",
                self.retreat_after_units_left
            )));
        }
        Ok(())
    }
}

/// Configuration for one calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    // === REPETITIONS ===
    /// Number of battles simulated by `calculate()`
    ///
    /// More runs tighten the estimate; 1000 gives roughly +/-3% on win odds.
    pub run_count: u32,

    /// Fixed seed for reproducible results
    ///
    /// When set, repetition `i` always draws from the same stream no matter
    /// which worker runs it. When unset every worker seeds from OS entropy.
    pub seed: Option<u64>,

    /// Round limit; battles still undecided afterwards count as draws
    pub max_rounds: u32,

    /// Attacking land units come from the sea and cannot retreat
    pub amphibious: bool,

    // === WORKER POOL ===
    /// Worker thread count (0 = available hardware parallelism)
    pub worker_threads: usize,

    /// Snapshot access strategy for workers
    pub snapshot_mode: SnapshotMode,

    /// Longest wait for in-flight repetitions once a stop was requested
    pub shutdown_timeout_ms: u64,

    /// Optional ceiling on a whole calculation
    pub time_limit_ms: Option<u64>,

    // === AUTOMATED PLAYERS ===
    pub policy: PolicyConfig,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            run_count: 1000,
            seed: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            amphibious: false,
            worker_threads: 0,
            snapshot_mode: SnapshotMode::Shared,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            time_limit_ms: None,
            policy: PolicyConfig::default(),
        }
    }
}

impl CalculatorConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: CalculatorConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    /// Worker count for `runs` repetitions, never more workers than runs
    pub fn effective_threads(&self, runs: u32) -> usize {
        let available = if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.worker_threads
        };
        available.min(runs.max(1) as usize).max(1)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        validate_run_count(self.run_count)?;
        if self.max_rounds == 0 {
            return Err(OddsError::InvalidConfig("max_rounds must be at least 1".into()));
        }
        self.policy.validate()
    }
}

pub fn validate_run_count(run_count: u32) -> Result<()> {
    if run_count > MAX_RUN_COUNT {
        return Err(OddsError::InvalidConfig(format!(
            "run_count ({}) must be <= {}",
            run_count, MAX_RUN_COUNT
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CalculatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy.retreat_round(), None);
        assert_eq!(config.policy.retreat_units_left(), None);
    }

    #[test]
    fn test_run_count_bounded() {
        let config = CalculatorConfig {
            run_count: MAX_RUN_COUNT + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OddsError::InvalidConfig(_))));
    }

    #[test]
    fn test_negative_thresholds_below_sentinel_rejected() {
        let mut config = CalculatorConfig::default();
        config.policy.retreat_after_round = -2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thresholds_convert() {
        let policy = PolicyConfig {
            retreat_after_round: 3,
            retreat_after_units_left: 0,
            ..Default::default()
        };
        assert_eq!(policy.retreat_round(), Some(3));
        assert_eq!(policy.retreat_units_left(), Some(0));
    }

    #[test]
    fn test_effective_threads_capped_by_runs() {
        let config = CalculatorConfig {
            worker_threads: 8,
            ..Default::default()
        };
        assert_eq!(config.effective_threads(3), 3);
        assert_eq!(config.effective_threads(0), 1);
        assert_eq!(config.effective_threads(100), 8);
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            run_count = 250
            seed = 7
            snapshot_mode = "per_worker"

            [policy]
            retreat_after_round = 2
            attacker_order_of_losses = "*^infantry"
        "#;
        let config: CalculatorConfig = toml::from_str(text).expect("config should parse");
        assert_eq!(config.run_count, 250);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.snapshot_mode, SnapshotMode::PerWorker);
        assert_eq!(config.policy.retreat_round(), Some(2));
        assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
        assert!(config.validate().is_ok());
    }
}
