//! Watch a game-server registry and announce servers coming up and going down.
//!
//! The registry is polled on an adjustable interval. Each server is identified
//! by its `(name, address, port)` triple; the set seen on the last successful
//! poll is kept on disk so a restart doesn't re-announce everything.

pub mod cli;
pub mod config;
pub mod logging;
pub mod registry;
pub mod state;
pub mod watcher;

pub use config::Settings;
pub use registry::{HttpRegistry, RawRecord, RegistryFetcher};
pub use state::{Delta, ServerKey, Snapshot, StateStore, WatchFilter};
pub use watcher::{NotificationSink, PollScheduler, SinkTarget, WatchControl, WatchError};
