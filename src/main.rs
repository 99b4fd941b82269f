//! fairload: priority and fairness load-test driver
//!
//! Launches batches of jobs against a workflow engine and reports how far
//! each priority level or fairness band has progressed.

use std::io::IsTerminal;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::launch::LaunchArgs;
use commands::status::StatusArgs;
use commands::GlobalArgs;

/// Priority and fairness load-test driver
#[derive(Parser)]
#[command(name = "fairload")]
#[command(about = "Launch and inspect priority/fairness load-test runs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control surface
    ///
    /// Serves /start-workflows, /run-status and /run-status-fairness.
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Submit one run
    Launch(LaunchArgs),

    /// Aggregate the progress of a run
    Status(StatusArgs),
}

fn main() -> Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    fairload::logging::init_logging(cli.global.verbose);

    if cli.global.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(execute_command(cli.command, &cli.global))
}

async fn execute_command(command: Commands, global: &GlobalArgs) -> Result<()> {
    match command {
        Commands::Serve { listen } => commands::serve::execute(listen, global).await,
        Commands::Launch(args) => commands::launch::execute(args, global).await,
        Commands::Status(args) => commands::status::execute(args, global).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use commands::EngineKind;
    use fairload::model::{Band, RunMode};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_launch_with_bands() {
        let cli = Cli::try_parse_from([
            "fairload",
            "launch",
            "--engine",
            "memory",
            "--band",
            "gold:10:2",
            "--band",
            "silver:1:8",
            "--seed",
            "7",
        ])
        .unwrap();
        assert_eq!(cli.global.engine, EngineKind::Memory);
        match cli.command {
            Commands::Launch(args) => {
                assert_eq!(args.mode, RunMode::Fairness);
                assert_eq!(
                    args.bands,
                    vec![
                        Band::new("gold", 10).with_count(2),
                        Band::new("silver", 1).with_count(8)
                    ]
                );
                assert_eq!(args.seed, Some(7));
            }
            _ => panic!("Expected launch command"),
        }
    }

    #[test]
    fn test_parse_status_priority() {
        let cli = Cli::try_parse_from([
            "fairload", "-v", "status", "--prefix", "run-1", "--mode", "priority", "--json",
        ])
        .unwrap();
        assert!(cli.global.verbose);
        match cli.command {
            Commands::Status(args) => {
                assert_eq!(args.prefix, "run-1");
                assert_eq!(args.mode, RunMode::Priority);
                assert!(args.json);
            }
            _ => panic!("Expected status command"),
        }
    }

    #[test]
    fn test_status_requires_prefix() {
        assert!(Cli::try_parse_from(["fairload", "status"]).is_err());
    }

    #[test]
    fn test_rejects_malformed_band() {
        assert!(Cli::try_parse_from(["fairload", "launch", "--band", "gold"]).is_err());
    }
}
