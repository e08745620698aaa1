// crates/stakeset-sim/src/main.rs
//
// CLI entrypoint for the stakeset committee simulator.
//
// Loads a TOML scenario (or a small default committee), builds the genesis
// state and drives it through epoch boundaries, printing the committee after
// each one. Log output goes to stderr so tables and JSON stay clean on stdout.

mod config;
mod output;
mod scenario;

use clap::{Parser, Subcommand};
use config::SimConfig;
use output::{format_json, format_table, param_rows, OutputFormat};
use scenario::Scenario;

/// Stakeset simulator: validator committee, staking pools and epoch boundaries.
#[derive(Parser, Debug)]
#[command(
    name = "stakeset",
    version = "0.1.0",
    about = "Simulate a proof-of-stake validator committee across epoch boundaries"
)]
struct Cli {
    /// Path to a TOML scenario. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Advance through the scenario's epochs and print the committee after each.
    Run {
        /// Override the number of epochs in the scenario.
        #[arg(long)]
        epochs: Option<u64>,
    },

    /// Run the scenario, then print one validator's exchange-rate history.
    Rates {
        /// Validator name as given in the scenario.
        validator: String,
    },

    /// Print the effective protocol parameters.
    Params,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_flag(cli.json);

    let mut sim_config = match &cli.config {
        Some(path) => {
            let cfg = SimConfig::load(path)?;
            tracing::info!("Loaded scenario from {}", path);
            cfg
        }
        None => {
            tracing::info!("No scenario given. Using the default committee.");
            SimConfig::default()
        }
    };

    match cli.command {
        Commands::Run { epochs } => {
            if let Some(epochs) = epochs {
                sim_config.epochs = epochs;
            }
            let mut scenario = Scenario::build(sim_config)?;
            let reports = scenario.run()?;
            match format {
                OutputFormat::Json => println!("{}", format_json(&reports)),
                OutputFormat::Table => {
                    for report in &reports {
                        println!(
                            "Epoch {}{}  total stake {}  storage fund {}  reference gas price {}",
                            report.epoch,
                            if report.safe_mode { " (safe mode)" } else { "" },
                            report.total_stake,
                            report.storage_fund,
                            report.reference_gas_price,
                        );
                        if let Some(error) = &report.error {
                            println!("  advance failed: {}", error);
                        }
                        println!("{}", format_table(&report.validators));
                        println!();
                    }
                    let state = scenario.state();
                    println!(
                        "Finished at epoch {}: {} active validators, subsidy remaining {}",
                        state.epoch(),
                        state.active_validator_addresses().len(),
                        output::format_tokens(state.stake_subsidy().balance()),
                    );
                }
            }
        }
        Commands::Rates { validator } => {
            let mut scenario = Scenario::build(sim_config)?;
            scenario.run()?;
            let rates = scenario.rates(&validator)?;
            match format {
                OutputFormat::Json => println!("{}", format_json(&rates)),
                OutputFormat::Table => println!("{}", format_table(&rates)),
            }
        }
        Commands::Params => {
            let rows = param_rows(&sim_config.parameters);
            match format {
                OutputFormat::Json => println!("{}", format_json(&sim_config.parameters)),
                OutputFormat::Table => println!("{}", format_table(&rows)),
            }
        }
    }

    Ok(())
}
