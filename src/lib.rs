//! Battle Odds - Monte Carlo battle outcome estimation for turn-based strategy games

pub mod battle;
pub mod calculator;
pub mod core;
pub mod policy;
pub mod world;
