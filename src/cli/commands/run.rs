//! Run command - watch the registry until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::cli::console::run_console;
use crate::config::Settings;
use crate::registry::HttpRegistry;
use crate::watcher::{PollScheduler, Readiness, WatchControl};

/// Command-line overrides for a single run. Not written back to the settings file.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub interval: Option<u64>,
    pub backend: Option<String>,
    pub webhook: Option<String>,
    pub no_console: bool,
}

impl RunOverrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(interval) = self.interval {
            settings.poll.interval_seconds = interval;
        }
        if let Some(backend) = &self.backend {
            settings.registry.backend_url = backend.clone();
        }
        if let Some(webhook) = &self.webhook {
            settings.notify.webhook_url = Some(webhook.clone());
        }
    }
}

/// Start the poll loop and the operator console, then wait for Ctrl-C.
pub async fn run_watch(
    settings: Settings,
    config_path: PathBuf,
    overrides: RunOverrides,
) -> anyhow::Result<()> {
    let mut effective = settings.clone();
    overrides.apply(&mut effective);
    effective.validate()?;

    let control = WatchControl::from_settings(&effective)?.with_settings_file(config_path, settings);
    let fetcher = HttpRegistry::new(
        &effective.registry.backend_url,
        Duration::from_secs(effective.registry.fetch_timeout_secs),
    )
    .context("Failed to set up registry client")?;

    eprintln!("Watching {}", fetcher.url());
    eprintln!(
        "Polling every {}s, state in {}",
        effective.poll.interval_seconds,
        effective.state_path.display()
    );

    let shutdown = CancellationToken::new();
    let readiness = Readiness::new();

    let scheduler = Arc::new(
        PollScheduler::builder()
            .control(Arc::new(control))
            .fetcher(fetcher)
            .fetch_timeout(Duration::from_secs(effective.registry.fetch_timeout_secs))
            .webhook_timeout(Duration::from_secs(effective.notify.webhook_timeout_secs))
            .readiness(&readiness)
            .shutdown(shutdown.clone())
            .build()?,
    );

    let poll_handle = scheduler.clone().spawn();

    if !overrides.no_console {
        eprintln!("Type 'help' for commands.");
        tokio::spawn(run_console(scheduler.clone(), shutdown.clone()));
    }

    readiness.mark_ready();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!("[run] failed to listen for ctrl+c: {e}");
            }
            eprintln!("Received shutdown signal");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    poll_handle.await.context("Poll task panicked")?;

    Ok(())
}
