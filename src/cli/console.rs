//! Operator console: line commands on stdin while the watcher runs.
//!
//! Commands mirror the chat commands the watcher was built around:
//! `status`, `interval`, `watch add|remove|list`, `sink set|clear|where`, `poll`.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::watcher::{CycleOutcome, PollScheduler, SinkTarget, WatchStatus};

const HELP: &str = "\
Commands:
  status               Show tracked servers
  interval [SECONDS]   Show or set the poll interval (min 5)
  watch add <NAME>     Only track listed names
  watch remove <NAME>  Stop filtering on a name
  watch list           Show name filters
  sink set <URL>       Post UP/DOWN messages to a webhook
  sink clear           Stop posting (log only)
  sink where           Show where messages go
  poll                 Poll the registry now
  quit                 Stop the watcher";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Interval(Option<u64>),
    WatchAdd(String),
    WatchRemove(String),
    WatchList,
    SinkSet(String),
    SinkClear,
    SinkWhere,
    Poll,
    Help,
    Quit,
}

/// Parse one input line.
pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command.to_lowercase().as_str() {
        "status" => Ok(ConsoleCommand::Status),
        "interval" | "setinterval" => {
            if rest.is_empty() {
                Ok(ConsoleCommand::Interval(None))
            } else {
                rest.parse()
                    .map(|secs| ConsoleCommand::Interval(Some(secs)))
                    .map_err(|_| format!("Not a number of seconds: {rest}"))
            }
        }
        "watch" => {
            let (action, name) = match rest.split_once(char::is_whitespace) {
                Some((action, name)) => (action, name.trim()),
                None => (rest, ""),
            };
            match action.to_lowercase().as_str() {
                "list" => Ok(ConsoleCommand::WatchList),
                "add" | "remove" if name.is_empty() => Err("Provide a server name.".to_string()),
                "add" => Ok(ConsoleCommand::WatchAdd(name.to_string())),
                "remove" => Ok(ConsoleCommand::WatchRemove(name.to_string())),
                _ => Err("Use add/remove/list".to_string()),
            }
        }
        "sink" => {
            let (action, arg) = match rest.split_once(char::is_whitespace) {
                Some((action, arg)) => (action, arg.trim()),
                None => (rest, ""),
            };
            match action.to_lowercase().as_str() {
                "set" if arg.is_empty() => Err("Provide a webhook URL.".to_string()),
                "set" => Ok(ConsoleCommand::SinkSet(arg.to_string())),
                "clear" => Ok(ConsoleCommand::SinkClear),
                "where" | "" => Ok(ConsoleCommand::SinkWhere),
                _ => Err("Use set/clear/where".to_string()),
            }
        }
        "poll" => Ok(ConsoleCommand::Poll),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!("Unknown command '{other}'. Type 'help'.")),
    }
}

/// Render a status report.
pub fn format_status(status: &WatchStatus) -> String {
    let mut lines = Vec::new();

    if status.servers.is_empty() {
        lines.push("No servers found.".to_string());
    } else {
        lines.push("Current Servers".to_string());
        for server in &status.servers {
            let map = server.map.as_deref().unwrap_or("?");
            lines.push(format!(
                "  • {} — {}:{} (map: {map})",
                server.key.name, server.key.address, server.key.port
            ));
        }
    }

    if status.stale {
        match (&status.health.last_error, status.health.last_success) {
            (Some(error), Some(at)) => lines.push(format!(
                "(stale: last successful poll {}, latest error: {error})",
                at.format("%H:%M:%S UTC")
            )),
            (Some(error), None) => lines.push(format!("(stale: no successful poll yet, latest error: {error})")),
            (None, _) => lines.push("(stale: no successful poll yet)".to_string()),
        }
    }

    if let Some(error) = &status.health.persistence_error {
        lines.push(format!("(state file not saved: {error})"));
    }

    lines.join("\n")
}

/// Execute a command against the running scheduler and return the reply.
pub async fn execute(command: ConsoleCommand, scheduler: &PollScheduler) -> String {
    let control = scheduler.control();

    match command {
        ConsoleCommand::Status => format_status(&control.status().await),
        ConsoleCommand::Interval(None) => {
            format!("Poll interval is {}s", control.interval_seconds())
        }
        ConsoleCommand::Interval(Some(seconds)) => match control.set_interval(seconds) {
            Ok(()) => format!("Poll interval set to {seconds}s"),
            Err(e) => e.to_string(),
        },
        ConsoleCommand::WatchAdd(name) => match control.add_filter(&name).await {
            Ok(true) => format!("Added filter: {name}"),
            Ok(false) => format!("Already filtering on: {name}"),
            Err(e) => e.to_string(),
        },
        ConsoleCommand::WatchRemove(name) => match control.remove_filter(&name).await {
            Ok(true) => format!("Removed filter: {name}"),
            Ok(false) => format!("No filter named: {name}"),
            Err(e) => e.to_string(),
        },
        ConsoleCommand::WatchList => {
            let names = control.filter_names().await;
            if names.is_empty() {
                "Filters: <none>".to_string()
            } else {
                format!("Filters: {}", names.join(", "))
            }
        }
        ConsoleCommand::SinkSet(url) => match SinkTarget::webhook(&url) {
            Ok(target) => {
                control.set_sink_target(target).await;
                match scheduler.fixed_sink() {
                    Some(fixed) => format!("Saved {url}, but events still go to {fixed}"),
                    None => format!("Okay! Posting to {url}"),
                }
            }
            Err(e) => e.to_string(),
        },
        ConsoleCommand::SinkClear => {
            control.clear_sink_target().await;
            "Posting disabled. Logging only.".to_string()
        }
        ConsoleCommand::SinkWhere => {
            if let Some(fixed) = scheduler.fixed_sink() {
                return format!("Posting to: {fixed} (fixed; 'sink set' has no effect)");
            }
            match control.sink_target().await {
                SinkTarget::Log => "No post target set. Use 'sink set <URL>'.".to_string(),
                target => format!("Posting to: {target}"),
            }
        }
        ConsoleCommand::Poll => match scheduler.poll_now().await {
            Ok(CycleOutcome::Unchanged { tracked }) => {
                format!("No changes ({tracked} servers tracked)")
            }
            Ok(CycleOutcome::Changed { delta, .. }) => format!(
                "{} up, {} down",
                delta.appeared.len(),
                delta.disappeared.len()
            ),
            Ok(CycleOutcome::FetchFailed { error }) => format!("Error: {error}"),
            Err(e) => e.to_string(),
        },
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => "Shutting down.".to_string(),
    }
}

/// Read commands from stdin until EOF, `quit`, or shutdown.
///
/// EOF and `quit` cancel `shutdown`.
pub async fn run_console(scheduler: Arc<PollScheduler>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => return,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                crate::debug_event!("console", "stdin closed");
                shutdown.cancel();
                return;
            }
            Err(e) => {
                tracing::warn!("[console] failed to read stdin: {e}");
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse(&line) {
            Ok(command) => {
                let quit = command == ConsoleCommand::Quit;
                println!("{}", execute(command, &scheduler).await);
                if quit {
                    shutdown.cancel();
                    return;
                }
            }
            Err(message) => println!("{message}"),
        }
    }
}
