//! Command-line definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Courier - priority task dispatcher
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    /// Path to a config file (default: ./.courier.yml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the worker, optionally submitting tasks from a file first
    Run {
        /// JSON or YAML file with task definitions ({priority, payload, scheduledAt})
        #[arg(short, long)]
        tasks: Option<PathBuf>,

        /// Exit once no PENDING or RESCHEDULED tasks remain
        #[arg(long)]
        until_idle: bool,
    },

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["courier", "-v", "run", "--tasks", "tasks.json", "--until-idle"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Run { tasks, until_idle } => {
                assert_eq!(tasks, Some(PathBuf::from("tasks.json")));
                assert!(until_idle);
            }
            Command::Config => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["courier", "config", "--config", "alt.yml"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.yml")));
        assert!(matches!(cli.command, Command::Config));
    }
}
