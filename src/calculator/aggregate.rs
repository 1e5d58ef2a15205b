//! Statistics over a set of repetition results
//!
//! All statistics are recomputed from the stored results on demand, so an
//! aggregate does not depend on the order its results arrived in.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::battle::resolver::BattleOutcome;
use crate::calculator::repetition::RepetitionResult;
use crate::core::types::Side;
use crate::world::unit::{Unit, UnitCostModel};

/// Results of one calculation
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    results: Vec<RepetitionResult>,
    initial_attackers: Vec<Unit>,
    initial_defenders: Vec<Unit>,
    dropped: usize,
    elapsed: Duration,
    cancelled: bool,
}

impl AggregateResult {
    pub fn new(results: Vec<RepetitionResult>, initial_attackers: Vec<Unit>, initial_defenders: Vec<Unit>) -> Self {
        Self {
            results,
            initial_attackers,
            initial_defenders,
            ..Default::default()
        }
    }

    pub(crate) fn with_dropped(mut self, dropped: usize) -> Self {
        self.dropped = dropped;
        self
    }

    pub(crate) fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub(crate) fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn results(&self) -> &[RepetitionResult] {
        &self.results
    }

    /// Completed repetitions that count towards the statistics
    pub fn repetitions(&self) -> usize {
        self.results.len()
    }

    /// Repetitions that failed and were left out
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Stopped early by a cancel request or time limit
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn initial_units(&self, side: Side) -> &[Unit] {
        match side {
            Side::Attacker => &self.initial_attackers,
            Side::Defender => &self.initial_defenders,
        }
    }

    fn fraction(&self, outcome: BattleOutcome) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let count = self.results.iter().filter(|r| r.outcome == outcome).count();
        count as f64 / self.results.len() as f64
    }

    /// Share of repetitions won by `side`, in `[0, 1]`
    pub fn win_percent(&self, side: Side) -> f64 {
        match side {
            Side::Attacker => self.fraction(BattleOutcome::AttackerWon),
            Side::Defender => self.fraction(BattleOutcome::DefenderWon),
        }
    }

    /// Share of repetitions ending in a draw, in `[0, 1]`
    pub fn draw_percent(&self) -> f64 {
        self.fraction(BattleOutcome::Draw)
    }

    pub fn average_units_left(&self, side: Side) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let total: usize = self.results.iter().map(|r| r.units_left(side)).sum();
        total as f64 / self.results.len() as f64
    }

    /// Average survivors over the repetitions `side` won
    pub fn average_units_left_when_won(&self, side: Side) -> f64 {
        let won: Vec<&RepetitionResult> = self.results.iter().filter(|r| r.outcome.won_by(side)).collect();
        if won.is_empty() {
            return 0.0;
        }
        let total: usize = won.iter().map(|r| r.units_left(side)).sum();
        total as f64 / won.len() as f64
    }

    /// Mean rounds per battle; 1.0 when nothing completed
    pub fn average_rounds_fought(&self) -> f64 {
        if self.results.is_empty() {
            return 1.0;
        }
        let total: u64 = self.results.iter().map(|r| u64::from(r.rounds)).sum();
        total as f64 / self.results.len() as f64
    }

    pub fn average_value_left(&self, side: Side, costs: &dyn UnitCostModel) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let total: f64 = self.results.iter().map(|r| costs.total_cost(r.remaining(side))).sum();
        total / self.results.len() as f64
    }

    /// Value the defender lost minus value the attacker lost
    ///
    /// Positive numbers favour the attacker.
    pub fn average_value_swing(&self, costs: &dyn UnitCostModel) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let lost = |side: Side| costs.total_cost(self.initial_units(side)) - self.average_value_left(side, costs);
        lost(Side::Defender) - lost(Side::Attacker)
    }

    /// The repetition whose survivor counts sit closest to the averages
    ///
    /// Ties go to fewer rounds, then fewer survivors.
    pub fn closest_to_average(&self) -> Option<&RepetitionResult> {
        let avg_attackers = self.average_units_left(Side::Attacker);
        let avg_defenders = self.average_units_left(Side::Defender);
        self.results.iter().min_by_key(|r| {
            let attackers = r.units_left(Side::Attacker);
            let defenders = r.units_left(Side::Defender);
            let deviation = (attackers as f64 - avg_attackers).abs() + (defenders as f64 - avg_defenders).abs();
            (OrderedFloat(deviation), r.rounds, attackers, defenders)
        })
    }

    /// Serializable digest for reports
    pub fn summary(&self, costs: &dyn UnitCostModel) -> AggregateSummary {
        AggregateSummary {
            repetitions: self.repetitions(),
            dropped: self.dropped,
            cancelled: self.cancelled,
            elapsed_ms: self.elapsed.as_millis() as u64,
            attacker_win: self.win_percent(Side::Attacker),
            defender_win: self.win_percent(Side::Defender),
            draw: self.draw_percent(),
            attacker_units_left: self.average_units_left(Side::Attacker),
            defender_units_left: self.average_units_left(Side::Defender),
            attacker_units_left_when_won: self.average_units_left_when_won(Side::Attacker),
            defender_units_left_when_won: self.average_units_left_when_won(Side::Defender),
            attacker_value_left: self.average_value_left(Side::Attacker, costs),
            defender_value_left: self.average_value_left(Side::Defender, costs),
            value_swing: self.average_value_swing(costs),
            average_rounds: self.average_rounds_fought(),
        }
    }
}

/// Flat view of an [`AggregateResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub repetitions: usize,
    pub dropped: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub attacker_win: f64,
    pub defender_win: f64,
    pub draw: f64,
    pub attacker_units_left: f64,
    pub defender_units_left: f64,
    pub attacker_units_left_when_won: f64,
    pub defender_units_left_when_won: f64,
    pub attacker_value_left: f64,
    pub defender_value_left: f64,
    pub value_swing: f64,
    pub average_rounds: f64,
}

impl std::fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Repetitions:      {} ({} dropped{})", self.repetitions, self.dropped, if self.cancelled { ", cancelled" } else { "" })?;
        writeln!(f, "Attacker wins:    {:.1}%", self.attacker_win * 100.0)?;
        writeln!(f, "Defender wins:    {:.1}%", self.defender_win * 100.0)?;
        writeln!(f, "Draws:            {:.1}%", self.draw * 100.0)?;
        writeln!(
            f,
            "Units left:       {:.2} attacking / {:.2} defending",
            self.attacker_units_left, self.defender_units_left
        )?;
        writeln!(
            f,
            "Left when won:    {:.2} attacking / {:.2} defending",
            self.attacker_units_left_when_won, self.defender_units_left_when_won
        )?;
        writeln!(f, "Value swing:      {:+.2}", self.value_swing)?;
        writeln!(f, "Average rounds:   {:.2}", self.average_rounds)?;
        write!(f, "Time:             {} ms", self.elapsed_ms)
    }
}
