//! Vouch command-line interface
//!
//! Operator tooling around the trust pipeline: node key generation, packet
//! inspection, configuration display and in-process network simulations.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{
    config::{handle_config_command, load_config},
    inspect::{handle_inspect_command, InspectCommand},
    keygen::{handle_keygen_command, KeygenCommand},
    simulate::{handle_simulate_command, SimulateCommand},
};

#[derive(Parser)]
#[command(name = "vouch")]
#[command(about = "Vouch - sensing-grounded packet trust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a node key pair
    Keygen(KeygenCommand),
    /// Decode and verify a wire packet
    Inspect(InspectCommand),
    /// Print the effective configuration
    Config,
    /// Run a broadcaster, relays and a receiver in-process
    Simulate(SimulateCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Keygen(cmd) => handle_keygen_command(cmd)?,
        Commands::Inspect(cmd) => handle_inspect_command(cmd, &config)?,
        Commands::Config => handle_config_command(&config)?,
        Commands::Simulate(cmd) => handle_simulate_command(cmd, config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["vouch", "config", "--verbose", "-c", "vouch.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("vouch.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_parse_keygen() {
        let cli = Cli::try_parse_from(["vouch", "keygen", "--out-dir", "keys", "--name", "robot"])
            .unwrap();
        let Commands::Keygen(cmd) = cli.command else {
            panic!("expected keygen");
        };
        assert_eq!(cmd.out_dir, PathBuf::from("keys"));
        assert_eq!(cmd.name, "robot");
    }

    #[test]
    fn test_inspect_requires_file() {
        assert!(Cli::try_parse_from(["vouch", "inspect"]).is_err());
    }
}
