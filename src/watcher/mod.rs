//! Registry watcher: polls the server list and announces changes.
//!
//! # Architecture
//!
//! ```text
//! PollScheduler (own tokio task)
//!   - RegistryFetcher (bounded by fetch timeout)
//!   - WatchControl (snapshot + filter + health + sink target, one lock)
//!   - StateStore (written only when something changed)
//!         |
//!    SinkTarget -> LogSink | WebhookSink   (or a fixed sink, e.g. BroadcastSink)
//! ```
//!
//! Command handlers share the same `Arc<WatchControl>` to query status and
//! change the interval, filter and sink target while the loop runs.

mod control;
mod error;
mod scheduler;
mod sink;
pub mod sinks;

pub use control::{Applied, PollHealth, TrackedServer, WatchControl, WatchStatus, build_snapshot};
pub use error::WatchError;
pub use scheduler::{CycleOutcome, PollScheduler, PollSchedulerBuilder, Readiness};
pub use sink::{NotificationSink, SinkTarget};
