//! Shared watcher state and the runtime controls exposed to operators.
//!
//! Snapshot, filter, poll health and sink target sit behind one
//! `tokio::sync::RwLock`, so a status read never sees a half-applied cycle.
//! The poll interval is published on a `watch` channel the scheduler
//! listens to. When a settings file is attached, every control change is
//! written back to it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{RwLock, watch};

use super::WatchError;
use super::sink::SinkTarget;
use crate::config::{MIN_INTERVAL_SECS, Settings};
use crate::registry::{RawRecord, resolve};
use crate::state::{Delta, ServerKey, Snapshot, StateStore, WatchFilter};

/// Filter raw records and resolve the survivors to a snapshot.
///
/// The filter is checked against the raw name before resolution, so
/// filtered-out entries never reach the snapshot. The second value holds
/// the map label for each tracked server (first one wins on duplicates).
pub fn build_snapshot(
    records: &[RawRecord],
    filter: &WatchFilter,
) -> (Snapshot, BTreeMap<ServerKey, Option<String>>) {
    let mut snapshot = Snapshot::new();
    let mut labels = BTreeMap::new();

    for record in records.iter().filter(|r| filter.accepts(r.name())) {
        let key = resolve(record);
        labels
            .entry(key.clone())
            .or_insert_with(|| record.map().map(str::to_string));
        snapshot.insert(key);
    }

    (snapshot, labels)
}

/// Outcome of applying one successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub delta: Delta,
    /// Number of servers tracked after this cycle.
    pub tracked: usize,
    /// False if the state file could not be written this cycle.
    pub persisted: bool,
}

/// Health of the poll loop, for staleness reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollHealth {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Set while the state file lags the in-memory snapshot; cleared by the next good write.
    pub persistence_error: Option<String>,
}

#[derive(Debug, Default)]
struct Tracked {
    snapshot: Snapshot,
    filter: WatchFilter,
    labels: BTreeMap<ServerKey, Option<String>>,
    health: PollHealth,
    sink: SinkTarget,
}

/// A tracked server as reported by [`WatchControl::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedServer {
    pub key: ServerKey,
    /// Map label from the last successful fetch, if known.
    pub map: Option<String>,
}

/// Point-in-time view of the watcher for status queries.
#[derive(Debug, Clone)]
pub struct WatchStatus {
    /// Last known servers, sorted by key.
    pub servers: Vec<TrackedServer>,
    /// True when the list may be out of date: no successful poll yet, or the
    /// most recent poll failed.
    pub stale: bool,
    pub health: PollHealth,
    pub interval_seconds: u64,
    pub filter: Vec<String>,
    pub sink: SinkTarget,
}

struct SettingsLink {
    path: PathBuf,
    settings: Mutex<Settings>,
}

/// Handle shared between the scheduler and command handlers.
pub struct WatchControl {
    tracked: RwLock<Tracked>,
    interval_tx: watch::Sender<Duration>,
    store: StateStore,
    settings: Option<SettingsLink>,
}

impl WatchControl {
    /// Create a control handle, loading the last snapshot from `store`.
    ///
    /// A missing or unreadable state file starts the watcher with nothing known.
    pub fn new(store: StateStore, filter: WatchFilter, interval: Duration, sink: SinkTarget) -> Self {
        let snapshot = store.load_or_default();
        let (interval_tx, _) = watch::channel(interval);

        Self {
            tracked: RwLock::new(Tracked {
                snapshot,
                filter,
                sink,
                ..Tracked::default()
            }),
            interval_tx,
            store,
            settings: None,
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, WatchError> {
        let sink = SinkTarget::from_config(settings.webhook_url())?;
        Ok(Self::new(
            StateStore::new(&settings.state_path),
            settings.watch.names.iter().cloned().collect(),
            Duration::from_secs(settings.poll.interval_seconds),
            sink,
        ))
    }

    /// Write control changes back to `path`, starting from `settings`.
    pub fn with_settings_file(mut self, path: PathBuf, settings: Settings) -> Self {
        self.settings = Some(SettingsLink {
            path,
            settings: Mutex::new(settings),
        });
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    // ---- poll cycle -------------------------------------------------------

    /// Diff a fresh fetch against the current snapshot and, if anything
    /// changed, persist and swap in the new snapshot.
    ///
    /// The state file is written before the in-memory snapshot is replaced.
    /// A write failure is logged and recorded but the swap still happens, so
    /// notifications are not held back. While a write failure is outstanding
    /// every successful cycle retries the write, changed or not.
    pub async fn apply(&self, records: &[RawRecord]) -> Applied {
        let mut tracked = self.tracked.write().await;

        let (current, labels) = build_snapshot(records, &tracked.filter);
        let delta = tracked.snapshot.diff(&current);
        let retry = tracked.health.persistence_error.is_some();

        let mut persisted = true;
        if !delta.is_empty() || retry {
            match self.persist(&current).await {
                Ok(()) => {
                    if retry {
                        crate::log_event!("state", "recovered", "{}", self.store.path().display());
                    }
                    tracked.health.persistence_error = None;
                }
                Err(e) => {
                    tracing::error!("[state] failed to persist snapshot: {e}");
                    tracked.health.persistence_error = Some(e);
                    persisted = false;
                }
            }
            tracked.snapshot = current;
        }

        tracked.labels = labels;
        tracked.health.last_success = Some(Utc::now());
        tracked.health.consecutive_failures = 0;
        tracked.health.last_error = None;

        Applied {
            delta,
            tracked: tracked.snapshot.len(),
            persisted,
        }
    }

    /// Write `snapshot` on the blocking pool. Callers keep holding the state
    /// lock, so the file and memory still change together.
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), String> {
        let store = self.store.clone();
        let snapshot = snapshot.clone();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("state writer task failed: {e}")),
        }
    }

    /// Record a failed fetch. The snapshot is left untouched.
    pub async fn record_failure(&self, error: &str) {
        let mut tracked = self.tracked.write().await;
        tracked.health.last_failure = Some(Utc::now());
        tracked.health.last_error = Some(error.to_string());
        tracked.health.consecutive_failures = tracked.health.consecutive_failures.saturating_add(1);
    }

    // ---- queries ----------------------------------------------------------

    /// Copy of the current snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.tracked.read().await.snapshot.clone()
    }

    pub async fn health(&self) -> PollHealth {
        self.tracked.read().await.health.clone()
    }

    /// Current tracked set with staleness information.
    pub async fn status(&self) -> WatchStatus {
        let tracked = self.tracked.read().await;

        let servers = tracked
            .snapshot
            .iter()
            .map(|key| TrackedServer {
                key: key.clone(),
                map: tracked.labels.get(key).cloned().flatten(),
            })
            .collect();

        let stale =
            tracked.health.last_success.is_none() || tracked.health.consecutive_failures > 0;

        WatchStatus {
            servers,
            stale,
            health: tracked.health.clone(),
            interval_seconds: self.interval_seconds(),
            filter: tracked.filter.names(),
            sink: tracked.sink.clone(),
        }
    }

    // ---- interval ---------------------------------------------------------

    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval().as_secs()
    }

    /// Change the poll interval. Takes effect for the next tick.
    pub fn set_interval(&self, seconds: u64) -> Result<(), WatchError> {
        if seconds < MIN_INTERVAL_SECS {
            return Err(WatchError::IntervalTooShort {
                requested: seconds,
                minimum: MIN_INTERVAL_SECS,
            });
        }

        self.interval_tx.send_replace(Duration::from_secs(seconds));
        crate::log_event!("control", "interval", "{seconds}s");
        self.write_back(|s| s.poll.interval_seconds = seconds);
        Ok(())
    }

    /// Receiver notified whenever the interval changes.
    pub fn subscribe_interval(&self) -> watch::Receiver<Duration> {
        self.interval_tx.subscribe()
    }

    // ---- filter -----------------------------------------------------------

    /// Start tracking `name` (and only listed names). Returns false if already listed.
    pub async fn add_filter(&self, name: &str) -> Result<bool, WatchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WatchError::EmptyName);
        }

        let (added, names) = {
            let mut tracked = self.tracked.write().await;
            let added = tracked.filter.add(name);
            (added, tracked.filter.names())
        };

        if added {
            crate::log_event!("control", "filter added", "{name}");
            self.write_back(|s| s.watch.names = names);
        }
        Ok(added)
    }

    /// Stop filtering on `name`. Returns false if it wasn't listed.
    pub async fn remove_filter(&self, name: &str) -> Result<bool, WatchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WatchError::EmptyName);
        }

        let (removed, names) = {
            let mut tracked = self.tracked.write().await;
            let removed = tracked.filter.remove(name);
            (removed, tracked.filter.names())
        };

        if removed {
            crate::log_event!("control", "filter removed", "{name}");
            self.write_back(|s| s.watch.names = names);
        }
        Ok(removed)
    }

    /// Filter names in sorted order. Empty means everything is tracked.
    pub async fn filter_names(&self) -> Vec<String> {
        self.tracked.read().await.filter.names()
    }

    // ---- sink target ------------------------------------------------------

    pub async fn sink_target(&self) -> SinkTarget {
        self.tracked.read().await.sink.clone()
    }

    /// Send future notifications to `target`.
    pub async fn set_sink_target(&self, target: SinkTarget) {
        let url = target.webhook_url().map(str::to_string);
        crate::log_event!("control", "sink", "{target}");
        self.tracked.write().await.sink = target;
        self.write_back(|s| s.notify.webhook_url = url);
    }

    /// Stop posting anywhere; events are logged only.
    pub async fn clear_sink_target(&self) {
        self.set_sink_target(SinkTarget::Log).await;
    }

    fn write_back(&self, update: impl FnOnce(&mut Settings)) {
        let Some(link) = &self.settings else {
            return;
        };

        let mut settings = link.settings.lock();
        update(&mut settings);
        if let Err(e) = settings.save(&link.path) {
            tracing::warn!(
                "[control] failed to save settings to {}: {e}",
                link.path.display()
            );
        }
    }
}
