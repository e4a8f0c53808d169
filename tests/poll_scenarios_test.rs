//! End-to-end poll cycles against scripted registries.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serverwatch::registry::{FetchError, RawRecord, RegistryFetcher};
use serverwatch::state::{EventKind, ServerEvent, ServerKey, StateStore, WatchFilter};
use serverwatch::watcher::sinks::BroadcastSink;
use serverwatch::watcher::{
    CycleOutcome, NotificationSink, PollScheduler, Readiness, SinkTarget, WatchControl, WatchError,
};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Hands out one scripted response per call; repeats the last one when the script runs out.
struct Scripted {
    responses: Mutex<VecDeque<Vec<RawRecord>>>,
    last: Mutex<Vec<RawRecord>>,
    calls: Arc<Mutex<Vec<Instant>>>,
}

impl Scripted {
    fn new(responses: Vec<Vec<RawRecord>>) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(Vec::new()),
            calls: calls.clone(),
        };
        (fetcher, calls)
    }
}

#[async_trait]
impl RegistryFetcher for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.lock().push(Instant::now());
        let mut last = self.last.lock();
        if let Some(next) = self.responses.lock().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Never answers.
struct Hanging {
    calls: Arc<Mutex<Vec<Instant>>>,
}

#[async_trait]
impl RegistryFetcher for Hanging {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.lock().push(Instant::now());
        std::future::pending().await
    }
}

/// Blocks until released, so a cycle can be held open.
struct Gated {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl RegistryFetcher for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![RawRecord::new("A", "1.1.1.1", 100)])
    }
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<ServerEvent>>,
    calls: Mutex<usize>,
}

#[async_trait]
impl NotificationSink for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(
        &self,
        appeared: &[ServerKey],
        disappeared: &[ServerKey],
    ) -> Result<(), WatchError> {
        *self.calls.lock() += 1;
        let mut events = self.events.lock();
        for server in appeared {
            events.push(ServerEvent {
                kind: EventKind::Up,
                server: server.clone(),
            });
        }
        for server in disappeared {
            events.push(ServerEvent {
                kind: EventKind::Down,
                server: server.clone(),
            });
        }
        Ok(())
    }
}

fn control(dir: &TempDir, filter: WatchFilter, interval_secs: u64) -> Arc<WatchControl> {
    Arc::new(WatchControl::new(
        StateStore::new(dir.path().join("watcher_state.json")),
        filter,
        Duration::from_secs(interval_secs),
        SinkTarget::Log,
    ))
}

fn key(name: &str, address: &str, port: u16) -> ServerKey {
    ServerKey::new(name, address, port)
}

fn up(server: ServerKey) -> ServerEvent {
    ServerEvent {
        kind: EventKind::Up,
        server,
    }
}

fn down(server: ServerKey) -> ServerEvent {
    ServerEvent {
        kind: EventKind::Down,
        server,
    }
}

fn offsets(calls: &Mutex<Vec<Instant>>, start: Instant) -> Vec<u64> {
    calls
        .lock()
        .iter()
        .map(|at| at.duration_since(start).as_secs())
        .collect()
}

#[tokio::test]
async fn test_new_server_comes_up() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(Recording::default());
    let (fetcher, _) = Scripted::new(vec![vec![RawRecord::new("A", "1.1.1.1", 100)]]);
    let scheduler = PollScheduler::builder()
        .control(control(&dir, WatchFilter::new(), 15))
        .fetcher(fetcher)
        .sink(sink.clone())
        .build()
        .unwrap();

    scheduler.poll_now().await.unwrap();

    assert_eq!(*sink.events.lock(), vec![up(key("A", "1.1.1.1", 100))]);
    let persisted = scheduler.control().store().load().unwrap();
    assert!(persisted.contains(&key("A", "1.1.1.1", 100)));
}

#[tokio::test]
async fn test_server_goes_down() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(Recording::default());
    let (fetcher, _) = Scripted::new(vec![vec![RawRecord::new("A", "1.1.1.1", 100)], vec![]]);
    let scheduler = PollScheduler::builder()
        .control(control(&dir, WatchFilter::new(), 15))
        .fetcher(fetcher)
        .sink(sink.clone())
        .build()
        .unwrap();

    scheduler.poll_now().await.unwrap();
    scheduler.poll_now().await.unwrap();

    assert_eq!(
        *sink.events.lock(),
        vec![up(key("A", "1.1.1.1", 100)), down(key("A", "1.1.1.1", 100))]
    );
    assert!(scheduler.control().store().load().unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_fetch_is_silent_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(Recording::default());
    let (fetcher, _) = Scripted::new(vec![vec![RawRecord::new("A", "1.1.1.1", 100)]]);
    let scheduler = PollScheduler::builder()
        .control(control(&dir, WatchFilter::new(), 15))
        .fetcher(fetcher)
        .sink(sink.clone())
        .build()
        .unwrap();

    scheduler.poll_now().await.unwrap();
    let store = scheduler.control().store();
    store.clear().unwrap();

    let outcome = scheduler.poll_now().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Unchanged { tracked: 1 });
    assert_eq!(*sink.calls.lock(), 1, "sink only called for the first change");
    assert!(!store.exists(), "unchanged cycle must not rewrite state");
}

#[tokio::test]
async fn test_filtered_names_never_reach_state() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(Recording::default());
    let filter: WatchFilter = ["A"].into_iter().collect();
    let (fetcher, _) = Scripted::new(vec![vec![
        RawRecord::new("A", "1.1.1.1", 100),
        RawRecord::new("B", "2.2.2.2", 200),
    ]]);
    let scheduler = PollScheduler::builder()
        .control(control(&dir, filter, 15))
        .fetcher(fetcher)
        .sink(sink.clone())
        .build()
        .unwrap();

    scheduler.poll_now().await.unwrap();

    assert_eq!(*sink.events.lock(), vec![up(key("A", "1.1.1.1", 100))]);
    let persisted = scheduler.control().store().load().unwrap();
    assert_eq!(persisted.len(), 1);
    assert!(persisted.iter().all(|k| k.name == "A"));
}

#[tokio::test]
async fn test_ups_precede_downs_and_each_group_is_sorted() {
    let dir = TempDir::new().unwrap();
    let broadcast = Arc::new(BroadcastSink::new(16));
    let mut rx = broadcast.subscribe();
    let (fetcher, _) = Scripted::new(vec![
        vec![
            RawRecord::new("Z", "9.9.9.9", 1),
            RawRecord::new("M", "5.5.5.5", 1),
        ],
        vec![
            RawRecord::new("C", "3.3.3.3", 1),
            RawRecord::new("B", "2.2.2.2", 1),
        ],
    ]);
    let scheduler = PollScheduler::builder()
        .control(control(&dir, WatchFilter::new(), 15))
        .fetcher(fetcher)
        .sink(broadcast.clone())
        .build()
        .unwrap();

    scheduler.poll_now().await.unwrap();
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    scheduler.poll_now().await.unwrap();
    let mut second = Vec::new();
    for _ in 0..4 {
        second.push(rx.recv().await.unwrap());
    }

    assert_eq!(
        second,
        vec![
            up(key("B", "2.2.2.2", 1)),
            up(key("C", "3.3.3.3", 1)),
            down(key("M", "5.5.5.5", 1)),
            down(key("Z", "9.9.9.9", 1)),
        ]
    );
}

#[tokio::test]
async fn test_restart_does_not_reannounce() {
    let dir = TempDir::new().unwrap();
    let servers = vec![
        RawRecord::new("A", "1.1.1.1", 100),
        RawRecord::new("B", "2.2.2.2", 200),
    ];

    {
        let (fetcher, _) = Scripted::new(vec![servers.clone()]);
        let scheduler = PollScheduler::builder()
            .control(control(&dir, WatchFilter::new(), 15))
            .fetcher(fetcher)
            .sink(Arc::new(Recording::default()))
            .build()
            .unwrap();
        scheduler.poll_now().await.unwrap();
    }

    let sink = Arc::new(Recording::default());
    let (fetcher, _) = Scripted::new(vec![servers]);
    let restarted = PollScheduler::builder()
        .control(control(&dir, WatchFilter::new(), 15))
        .fetcher(fetcher)
        .sink(sink.clone())
        .build()
        .unwrap();

    assert_eq!(
        restarted.poll_now().await.unwrap(),
        CycleOutcome::Unchanged { tracked: 2 }
    );
    assert!(sink.events.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_keeps_snapshot_and_schedule() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::new(Recording::default());
    let shutdown = CancellationToken::new();
    let control = control(&dir, WatchFilter::new(), 15);

    let scheduler = Arc::new(
        PollScheduler::builder()
            .control(control.clone())
            .fetcher(Hanging {
                calls: calls.clone(),
            })
            .sink(sink.clone())
            .fetch_timeout(Duration::from_secs(5))
            .shutdown(shutdown.clone())
            .build()
            .unwrap(),
    );

    let start = Instant::now();
    let handle = scheduler.spawn();
    tokio::time::sleep(Duration::from_secs(20)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(offsets(&calls, start), vec![0, 15]);
    assert!(control.snapshot().await.is_empty());
    assert!(sink.events.lock().is_empty());

    let status = control.status().await;
    assert!(status.stale);
    assert_eq!(status.health.consecutive_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_takes_effect_at_next_tick() {
    let dir = TempDir::new().unwrap();
    let (fetcher, calls) = Scripted::new(vec![]);
    let shutdown = CancellationToken::new();
    let control = control(&dir, WatchFilter::new(), 15);

    let scheduler = Arc::new(
        PollScheduler::builder()
            .control(control.clone())
            .fetcher(fetcher)
            .sink(Arc::new(Recording::default()))
            .shutdown(shutdown.clone())
            .build()
            .unwrap(),
    );

    let start = Instant::now();
    let handle = scheduler.spawn();

    tokio::time::sleep(Duration::from_secs(2)).await;
    control.set_interval(5).unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    shutdown.cancel();
    handle.await.unwrap();

    // Cycles at 0, then every 5s: no fire at 15, none doubled at the switch
    assert_eq!(offsets(&calls, start), vec![0, 5, 10]);
}

#[tokio::test(start_paused = true)]
async fn test_interval_lowered_past_due_fires_once_immediately() {
    let dir = TempDir::new().unwrap();
    let (fetcher, calls) = Scripted::new(vec![]);
    let shutdown = CancellationToken::new();
    let control = control(&dir, WatchFilter::new(), 15);

    let scheduler = Arc::new(
        PollScheduler::builder()
            .control(control.clone())
            .fetcher(fetcher)
            .sink(Arc::new(Recording::default()))
            .shutdown(shutdown.clone())
            .build()
            .unwrap(),
    );

    let start = Instant::now();
    let handle = scheduler.spawn();

    // 0 + 5 is already behind us at t=12
    tokio::time::sleep(Duration::from_secs(12)).await;
    control.set_interval(5).unwrap();

    tokio::time::sleep(Duration::from_secs(8)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(offsets(&calls, start), vec![0, 12, 17]);
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_waits_for_readiness() {
    let dir = TempDir::new().unwrap();
    let (fetcher, calls) = Scripted::new(vec![]);
    let readiness = Readiness::new();
    let shutdown = CancellationToken::new();

    let scheduler = Arc::new(
        PollScheduler::builder()
            .control(control(&dir, WatchFilter::new(), 15))
            .fetcher(fetcher)
            .readiness(&readiness)
            .shutdown(shutdown.clone())
            .build()
            .unwrap(),
    );
    let handle = scheduler.spawn();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(calls.lock().is_empty(), "no poll before the host is ready");

    readiness.mark_ready();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(calls.lock().len(), 1);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_manual_poll_skipped_while_cycle_runs() {
    let dir = TempDir::new().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let scheduler = Arc::new(
        PollScheduler::builder()
            .control(control(&dir, WatchFilter::new(), 15))
            .fetcher(Gated {
                entered: entered.clone(),
                release: release.clone(),
            })
            .sink(Arc::new(Recording::default()))
            .build()
            .unwrap(),
    );

    let in_flight = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.poll_now().await })
    };
    entered.notified().await;

    assert!(matches!(
        scheduler.poll_now().await,
        Err(WatchError::CycleInProgress)
    ));

    release.notify_one();
    let outcome = in_flight.await.unwrap().unwrap();
    assert!(matches!(outcome, CycleOutcome::Changed { .. }));
}
