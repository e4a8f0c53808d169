//! Command-line interface: argument parsing, commands and the operator console.

pub mod args;
pub mod commands;
pub mod console;

pub use args::{Cli, Commands};
