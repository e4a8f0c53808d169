//! Tracked-server state: identity keys, snapshots, diffing, filtering and
//! durable storage.
//!
//! # Layout
//!
//! ```text
//! RawRecord --filter--> ServerKey --collect--> Snapshot
//!                                                |
//!                         previous Snapshot --diff--> Delta (ups, then downs)
//!                                                |
//!                                           StateStore (only when Delta non-empty)
//! ```

mod error;
mod filter;
mod snapshot;
mod store;

pub use error::{StateError, StateResult};
pub use filter::{WatchFilter, accepts};
pub use snapshot::{Delta, EventKind, ServerEvent, ServerKey, Snapshot, diff};
pub use store::StateStore;
