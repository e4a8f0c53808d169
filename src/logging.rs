//! Logging setup for the watcher.
//!
//! Everything goes to stderr so stdout stays free for console replies.
//! Levels come from `[logging]` in the settings file unless `RUST_LOG` is set:
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! "serverwatch::registry" = "debug"
//! ```

use std::io::IsTerminal;
use std::sync::Once;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Local wall clock with the date, since a watcher runs for days.
struct WallClock;

impl FormatTime for WallClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Directive string for `config`, modules in a stable order.
fn directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    std::iter::once(config.default.clone())
        .chain(modules.into_iter().map(|(module, level)| format!("{module}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Filter from `RUST_LOG` if set, else from config. A directive that
/// doesn't parse falls back to `info` rather than silencing everything.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return EnvFilter::from_default_env();
    }

    let wanted = directives(config);
    EnvFilter::try_new(&wanted).unwrap_or_else(|e| {
        eprintln!("Ignoring logging config '{wanted}': {e}");
        EnvFilter::new("info")
    })
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(false)
            .with_timer(WallClock)
            .with_filter(build_filter(config));

        tracing_subscriber::registry().with(layer).init();
    });
}

/// Info line tagged with the subsystem that produced it: `[poll] changed: 1 up, 0 down`.
#[macro_export]
macro_rules! log_event {
    ($scope:expr, $what:expr) => {
        tracing::info!(scope = $scope, "[{}] {}", $scope, $what)
    };
    ($scope:expr, $what:expr, $($detail:tt)+) => {
        tracing::info!(scope = $scope, "[{}] {}: {}", $scope, $what, format!($($detail)+))
    };
}

/// Same as [`log_event!`] at debug level.
#[macro_export]
macro_rules! debug_event {
    ($scope:expr, $what:expr) => {
        tracing::debug!(scope = $scope, "[{}] {}", $scope, $what)
    };
    ($scope:expr, $what:expr, $($detail:tt)+) => {
        tracing::debug!(scope = $scope, "[{}] {}: {}", $scope, $what, format!($($detail)+))
    };
}
