//! GhostPool command line
//!
//! Writes sample configuration, runs scripted games against in-memory collaborators and
//! inspects stored snapshots.

use clap::{Parser, Subcommand};
use ghostpool::{
    config::{generate_sample_config, ConfigLoader, LoggingConfig, PoolConfig},
    errors::{ConfigurationError, PoolResult},
    game_store::{load_snapshot, store_snapshot},
    simulation::{run_scenario, Sandbox, Scenario},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ghostpool")]
#[command(about = "Pooled savings game with segment deposits and shared yield")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    SampleConfig {
        #[arg(default_value = "ghostpool.toml")]
        path: PathBuf,
    },

    /// Play a scripted scenario against in-memory collaborators
    Simulate {
        /// Configuration file; the testing preset when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Scenario file (TOML list of steps)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Store a snapshot of the final state here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Verify a stored snapshot and print a summary
    Inspect { snapshot: PathBuf },
}

fn main() -> PoolResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::SampleConfig { path } => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            generate_sample_config(&path.to_string_lossy())?;
            info!("Wrote sample configuration to {}", path.display());
            Ok(())
        }
        Commands::Simulate {
            config,
            scenario,
            snapshot,
        } => {
            let config = match config {
                Some(path) => ConfigLoader::new().with_path(path).load()?,
                None => PoolConfig::testing(),
            };
            init_logging(&config.logging, cli.verbose);
            simulate(config, &scenario, snapshot)
        }
        Commands::Inspect { snapshot } => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            inspect(&snapshot)
        }
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_filter() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn simulate(config: PoolConfig, scenario_path: &Path, snapshot: Option<PathBuf>) -> PoolResult<()> {
    let content = std::fs::read_to_string(scenario_path).map_err(|e| {
        ConfigurationError::LoadFailed(format!("Failed to read {}: {}", scenario_path.display(), e))
    })?;
    let scenario: Scenario = toml::from_str(&content)
        .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse scenario: {}", e)))?;

    let snapshot_path = snapshot.or_else(|| config.storage.snapshot_path.clone().map(PathBuf::from));
    let pretty = config.storage.pretty;

    let sandbox = Sandbox::new(config)?;
    info!("Running {} scenario steps", scenario.steps.len());
    let report = run_scenario(&sandbox, &scenario);

    for failure in report.failures() {
        warn!(
            "Step {} ({}) failed in segment {}: {}",
            failure.step, failure.action, failure.segment, failure.detail
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(path) = snapshot_path {
        let snapshot = sandbox.game.snapshot()?;
        store_snapshot(&path, &snapshot, pretty)?;
    }
    Ok(())
}

fn inspect(path: &Path) -> PoolResult<()> {
    let snapshot = load_snapshot(path)?;
    let state = &snapshot.state;

    println!("Snapshot:        {}", path.display());
    println!("Taken at:        {}", snapshot.taken_at);
    println!("State hash:      {}", snapshot.state_hash);
    println!(
        "Game:            {} segments of {}s, payment {}, fee {}%",
        snapshot.config.game.segment_count,
        snapshot.config.game.segment_length_secs,
        snapshot.config.game.segment_payment,
        snapshot.config.game.early_withdrawal_fee
    );
    println!("Yield token:     {}", snapshot.yield_token);
    println!("Players:         {}", state.ledger.player_count());
    println!("Winners:         {}", state.ledger.winners().len());
    println!("Principal:       {}", state.total_game_principal);
    println!("Pending:         {}", state.segments.total_pending());
    println!("Redeemed:        {}", state.redemption.is_redeemed());
    println!("Interest:        {}", state.redemption.total_game_interest());
    println!("Events:          {}", state.events.len());

    for address in state.ledger.roster() {
        if let Some(player) = state.ledger.player(address) {
            println!(
                "  {:<20} paid {:>12} through segment {:<4}{}",
                address.as_str(),
                player.amount_paid,
                player.most_recent_segment_paid,
                if player.withdrawn { " (withdrawn)" } else { "" }
            );
        }
    }
    Ok(())
}
