//! Poll scheduler: the fetch, diff, notify loop.
//!
//! ```text
//! Idle --tick--> Fetching --ok--> Diffing --changed--> Notifying --> Idle
//!                   |                |
//!                   +--error-------> Idle (snapshot untouched)
//!                                    +--unchanged----> Idle
//! ```
//!
//! Ticks are measured from the start of the previous cycle. Changing the
//! interval re-arms the pending tick against the new period; if that moment
//! has already passed the next cycle starts immediately, exactly once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use super::WatchError;
use super::control::WatchControl;
use super::sink::{NotificationSink, SinkTarget};
use super::sinks::{LogSink, WebhookSink};
use crate::registry::{FetchError, RawRecord, RegistryFetcher};
use crate::state::Delta;

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fetch succeeded and nothing changed.
    Unchanged { tracked: usize },
    /// Something came up or went down.
    Changed {
        delta: Delta,
        persisted: bool,
        delivered: bool,
    },
    /// The fetch failed; nothing was diffed or mutated.
    FetchFailed { error: String },
}

/// One-shot readiness gate for the first poll cycle.
///
/// The host flips it once its output side exists (e.g. a chat session is
/// connected), so no notification goes out before anything can receive it.
#[derive(Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the sink for each cycle from the current [`SinkTarget`].
struct SinkRouter {
    log: Arc<LogSink>,
    custom: Option<Arc<dyn NotificationSink>>,
    webhook: Mutex<Option<Arc<WebhookSink>>>,
    webhook_timeout: Duration,
}

impl SinkRouter {
    fn log(&self) -> Arc<dyn NotificationSink> {
        self.log.clone()
    }

    fn fixed(&self) -> Option<&str> {
        self.custom.as_deref().map(|sink| sink.name())
    }

    fn resolve(&self, target: &SinkTarget) -> Arc<dyn NotificationSink> {
        if let Some(custom) = &self.custom {
            return custom.clone();
        }

        match target {
            SinkTarget::Log => self.log(),
            SinkTarget::Webhook { url } => {
                let mut cached = self.webhook.lock();
                if let Some(sink) = cached.as_ref().filter(|s| s.url() == url) {
                    return sink.clone();
                }

                match WebhookSink::new(url.clone(), self.webhook_timeout) {
                    Ok(sink) => {
                        let sink = Arc::new(sink);
                        *cached = Some(sink.clone());
                        sink
                    }
                    Err(e) => {
                        tracing::warn!("[poll] {e}; logging events instead");
                        self.log()
                    }
                }
            }
        }
    }
}

/// Runs poll cycles on a timer until cancelled.
pub struct PollScheduler {
    control: Arc<WatchControl>,
    fetcher: Arc<dyn RegistryFetcher>,
    sinks: SinkRouter,
    fetch_timeout: Duration,
    ready: Option<watch::Receiver<bool>>,
    shutdown: CancellationToken,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl PollScheduler {
    /// Create a builder for configuring the scheduler.
    pub fn builder() -> PollSchedulerBuilder {
        PollSchedulerBuilder::new()
    }

    pub fn control(&self) -> &Arc<WatchControl> {
        &self.control
    }

    /// Name of the sink set with [`PollSchedulerBuilder::sink`], if any.
    ///
    /// When set, every cycle goes to that sink and the control's
    /// [`SinkTarget`] is not consulted.
    pub fn fixed_sink(&self) -> Option<&str> {
        self.sinks.fixed()
    }

    /// Token that stops [`PollScheduler::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the loop on its own task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Poll forever: wait for readiness, then one cycle per tick.
    ///
    /// Returns when the shutdown token is cancelled.
    pub async fn run(&self) {
        if !self.wait_until_ready().await {
            return;
        }

        crate::log_event!(
            "poll",
            "started",
            "every {}s using {}",
            self.control.interval_seconds(),
            self.fetcher.name()
        );

        let mut interval_rx = self.control.subscribe_interval();
        loop {
            let started = Instant::now();
            {
                let _cycle = self.cycle_lock.lock().await;
                self.cycle().await;
            }

            if !self.wait_for_next_tick(started, &mut interval_rx).await {
                break;
            }
        }

        crate::log_event!("poll", "stopped");
    }

    /// Run one cycle now, unless one is already in flight.
    pub async fn poll_now(&self) -> Result<CycleOutcome, WatchError> {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            return Err(WatchError::CycleInProgress);
        };
        Ok(self.cycle().await)
    }

    async fn wait_until_ready(&self) -> bool {
        let Some(mut ready) = self.ready.clone() else {
            return true;
        };

        if !*ready.borrow() {
            crate::debug_event!("poll", "waiting for readiness");
        }

        tokio::select! {
            res = ready.wait_for(|r| *r) => {
                if res.is_err() {
                    tracing::warn!("[poll] readiness signal dropped before firing; not starting");
                }
                res.is_ok()
            }
            _ = self.shutdown.cancelled() => false,
        }
    }

    /// Sleep until `started + interval`, re-arming when the interval changes.
    ///
    /// Returns false on shutdown.
    async fn wait_for_next_tick(
        &self,
        started: Instant,
        interval_rx: &mut watch::Receiver<Duration>,
    ) -> bool {
        let mut follow_changes = true;
        loop {
            let deadline = started + *interval_rx.borrow_and_update();

            tokio::select! {
                _ = sleep_until(deadline) => return true,
                changed = interval_rx.changed(), if follow_changes => {
                    if changed.is_err() {
                        follow_changes = false;
                    } else {
                        crate::debug_event!(
                            "poll",
                            "interval changed",
                            "{}s",
                            interval_rx.borrow().as_secs()
                        );
                    }
                }
                _ = self.shutdown.cancelled() => return false,
            }
        }
    }

    async fn cycle(&self) -> CycleOutcome {
        // Fetching
        let records = match self.fetch().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("[poll] fetch error: {e}");
                let error = e.to_string();
                self.control.record_failure(&error).await;
                return CycleOutcome::FetchFailed { error };
            }
        };

        // Diffing (and persisting, if changed)
        let applied = self.control.apply(&records).await;
        if applied.delta.is_empty() {
            crate::debug_event!("poll", "unchanged", "{} servers", applied.tracked);
            return CycleOutcome::Unchanged {
                tracked: applied.tracked,
            };
        }

        // Notifying
        let delta = applied.delta;
        crate::log_event!(
            "poll",
            "changed",
            "{} up, {} down ({} tracked)",
            delta.appeared.len(),
            delta.disappeared.len(),
            applied.tracked
        );

        let target = self.control.sink_target().await;
        let sink = self.sinks.resolve(&target);
        let delivered = match sink.notify(&delta.appeared, &delta.disappeared).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[{}] {e}", sink.name());
                false
            }
        };

        CycleOutcome::Changed {
            delta,
            persisted: applied.persisted,
            delivered,
        }
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        match timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                after: self.fetch_timeout,
            }),
        }
    }
}

/// Builder for constructing a PollScheduler.
pub struct PollSchedulerBuilder {
    control: Option<Arc<WatchControl>>,
    fetcher: Option<Arc<dyn RegistryFetcher>>,
    sink: Option<Arc<dyn NotificationSink>>,
    fetch_timeout: Duration,
    webhook_timeout: Duration,
    readiness: Option<Readiness>,
    shutdown: Option<CancellationToken>,
}

impl PollSchedulerBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            control: None,
            fetcher: None,
            sink: None,
            fetch_timeout: Duration::from_secs(5),
            webhook_timeout: Duration::from_secs(10),
            readiness: None,
            shutdown: None,
        }
    }

    /// Set the shared control handle.
    pub fn control(mut self, control: Arc<WatchControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Set the registry fetcher.
    pub fn fetcher(mut self, fetcher: impl RegistryFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Use a fixed sink instead of routing on the control's sink target.
    ///
    /// The target can still be changed through the control but has no
    /// effect on delivery; see [`PollScheduler::fixed_sink`].
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Upper bound on a single fetch.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Upper bound on a single webhook post.
    pub fn webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    /// Hold the first cycle until `readiness` fires.
    pub fn readiness(mut self, readiness: &Readiness) -> Self {
        self.readiness = Some(readiness.clone());
        self
    }

    /// Share an existing shutdown token.
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the PollScheduler.
    pub fn build(self) -> Result<PollScheduler, WatchError> {
        let control = self.control.ok_or_else(|| WatchError::InitFailed {
            reason: "Control handle is required".to_string(),
        })?;

        let fetcher = self.fetcher.ok_or_else(|| WatchError::InitFailed {
            reason: "Registry fetcher is required".to_string(),
        })?;

        if self.fetch_timeout.is_zero() {
            return Err(WatchError::InitFailed {
                reason: "Fetch timeout must be non-zero".to_string(),
            });
        }

        Ok(PollScheduler {
            control,
            fetcher,
            sinks: SinkRouter {
                log: Arc::new(LogSink::new()),
                custom: self.sink,
                webhook: Mutex::new(None),
                webhook_timeout: self.webhook_timeout,
            },
            fetch_timeout: self.fetch_timeout,
            ready: self.readiness.as_ref().map(Readiness::subscribe),
            shutdown: self.shutdown.unwrap_or_default(),
            cycle_lock: tokio::sync::Mutex::new(()),
        })
    }
}

impl Default for PollSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
