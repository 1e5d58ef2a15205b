//! Headless Odds Runner
//!
//! Loads a battle scenario, runs the odds calculator on it and prints the
//! aggregate statistics as JSON or text.

use battle_odds::calculator::{AggregateSummary, OddsCalculator};
use battle_odds::core::{CalculatorConfig, Result, Side};
use battle_odds::world::ScenarioLoader;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Headless Odds Runner - estimate battle outcomes by simulation
#[derive(Parser, Debug)]
#[command(name = "odds_runner")]
#[command(about = "Simulate a battle scenario many times and report win odds")]
struct Args {
    /// Scenario file (TOML)
    #[arg(long)]
    scenario: PathBuf,

    /// Calculator settings (TOML); overrides the scenario's own settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of repetitions
    #[arg(long)]
    runs: Option<u32>,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Attacker retreats once this round is reached
    #[arg(long)]
    retreat_after_round: Option<i32>,

    /// Attacker order of losses, e.g. "*^infantry;1^armour"
    #[arg(long)]
    attacker_order: Option<String>,

    /// Defender order of losses
    #[arg(long)]
    defender_order: Option<String>,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

/// JSON output structure
#[derive(Serialize)]
struct RunnerOutput {
    scenario: String,
    seed: Option<u64>,
    threads: usize,
    #[serde(flatten)]
    summary: AggregateSummary,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("battle_odds=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let scenario = ScenarioLoader::new().load_from_file(&args.scenario)?;

    let mut config = match &args.config {
        Some(path) => CalculatorConfig::load(path)?,
        None => scenario.config.clone().unwrap_or_default(),
    };
    if let Some(runs) = args.runs {
        config.run_count = runs;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(threads) = args.threads {
        config.worker_threads = threads;
    }
    if let Some(round) = args.retreat_after_round {
        config.policy.retreat_after_round = round;
    }
    let runs = config.run_count;
    let threads = config.effective_threads(runs);

    let mut calculator = OddsCalculator::with_config(config)?;
    calculator.set_world_state(&scenario.world);
    if args.attacker_order.is_some() {
        calculator.set_order_of_losses(Side::Attacker, args.attacker_order.as_deref())?;
    }
    if args.defender_order.is_some() {
        calculator.set_order_of_losses(Side::Defender, args.defender_order.as_deref())?;
    }

    tracing::info!("Simulating {:?}: {} runs on {} threads", scenario.name, runs, threads);
    let aggregate = calculator.configure_and_calculate(scenario.request, runs)?;
    let summary = aggregate.summary(scenario.world.catalog());

    match args.format.as_str() {
        "text" => {
            println!("Battle Odds: {}", scenario.name);
            println!("============");
            println!("{}", summary);
        }
        other => {
            if other != "json" {
                eprintln!("Unknown format '{}', defaulting to json", other);
            }
            let output = RunnerOutput {
                scenario: scenario.name,
                seed: calculator.config().seed,
                threads,
                summary,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
