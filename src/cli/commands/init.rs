//! Init and Config commands.

use std::path::Path;

use crate::config::{ConfigError, Settings};

/// Run init command - create configuration file.
pub fn run_init(config_path: Option<&Path>, force: bool) {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_config_path);

    match Settings::init_config_file(&config_path, force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
        }
        Err(ConfigError::AlreadyExists(path)) => {
            eprintln!("Configuration file already exists at: {}", path.display());
            eprintln!("Use --force to overwrite");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(config) {
        Ok(toml_str) => println!("{toml_str}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
}
