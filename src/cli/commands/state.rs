//! State command - print the persisted server set.

use crate::config::Settings;
use crate::state::StateStore;

pub fn run_state(config: &Settings) {
    let store = StateStore::new(&config.state_path);

    if !store.exists() {
        println!("No state file at {} yet.", store.path().display());
        return;
    }

    match store.load() {
        Ok(snapshot) if snapshot.is_empty() => println!("No servers found."),
        Ok(snapshot) => {
            println!("Last known servers ({}):", snapshot.len());
            for key in &snapshot {
                println!("  • {key}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
