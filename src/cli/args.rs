//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::MIN_INTERVAL_SECS;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Game-server registry watcher
#[derive(Parser)]
#[command(
    name = "serverwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Announce game servers coming up and going down",
    long_about = "Poll a game-server registry and announce servers that become available or disappear.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Write a default settings file
    #[command(about = "Create settings.toml with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Show the persisted server set
    #[command(about = "Print the last known servers from the state file")]
    State,

    /// Start watching the registry
    #[command(
        about = "Poll the registry and announce changes",
        after_help = "Examples:\n  serverwatch run\n  serverwatch run --interval 30\n  serverwatch run --webhook https://discord.com/api/webhooks/...\n\nWhile running, type 'help' for operator commands."
    )]
    Run {
        /// Poll interval in seconds (overrides config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(MIN_INTERVAL_SECS..))]
        interval: Option<u64>,

        /// Registry base URL (overrides config)
        #[arg(long)]
        backend: Option<String>,

        /// Webhook to post UP/DOWN messages to (overrides config)
        #[arg(long)]
        webhook: Option<String>,

        /// Don't read operator commands from stdin
        #[arg(long)]
        no_console: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_interval_minimum_enforced() {
        assert!(Cli::try_parse_from(["serverwatch", "run", "--interval", "4"]).is_err());

        let cli = Cli::try_parse_from(["serverwatch", "run", "--interval", "5"]).unwrap();
        match cli.command {
            Commands::Run { interval, .. } => assert_eq!(interval, Some(5)),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["serverwatch", "state", "--config", "/tmp/s.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
    }
}
