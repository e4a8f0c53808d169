//! serverwatch binary entry point.

use clap::Parser;

use serverwatch::cli::commands::run::RunOverrides;
use serverwatch::cli::commands::{init, run, state};
use serverwatch::cli::{Cli, Commands};
use serverwatch::{Settings, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Init must work even when the existing file is broken
    if let Commands::Init { force } = &cli.command {
        init::run_init(cli.config.as_deref(), *force);
        return;
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(Settings::default_config_path);

    let settings = match Settings::load(Some(config_path.as_path())) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Config => init::run_config(&settings),
        Commands::State => state::run_state(&settings),
        Commands::Run {
            interval,
            backend,
            webhook,
            no_console,
        } => {
            let overrides = RunOverrides {
                interval,
                backend,
                webhook,
                no_console,
            };
            if let Err(e) = run::run_watch(settings, config_path, overrides).await {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
