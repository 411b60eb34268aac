//! Interactive proctored session driven from stdin
//!
//! Each input line is either a simulated environment change (fed through
//! the standard detectors) or an operator command for the supervisor.

use anyhow::{Context, Result};
use proctor_core::{
    Collaborators, DetectorSet, EnvironmentChange, FileSink, InputAction, ManualSource, Proctor,
    ProctorConfig, ProctorHandle, SharedEnvironment, WARNING_THRESHOLD,
};
use proctor_storage::{Database, SessionState, SessionStatus, Visibility};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One parsed console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    Change(EnvironmentChange),
    Start,
    Submit,
    Resume,
    Online(bool),
    Help,
    Quit,
}

impl ConsoleInput {
    /// Parse a console line; `None` for anything unrecognised
    pub fn parse(line: &str) -> Option<Self> {
        let input = match line.trim().to_ascii_lowercase().as_str() {
            "hide" => Self::Change(EnvironmentChange::Visibility(Visibility::Hidden)),
            "show" => Self::Change(EnvironmentChange::Visibility(Visibility::Visible)),
            "blur" => Self::Change(EnvironmentChange::Focus(false)),
            "focus" => Self::Change(EnvironmentChange::Focus(true)),
            "fs-enter" => Self::Change(EnvironmentChange::Fullscreen(true)),
            "fs-exit" => Self::Change(EnvironmentChange::Fullscreen(false)),
            "copy" => Self::Change(EnvironmentChange::Intercepted(InputAction::Copy)),
            "paste" => Self::Change(EnvironmentChange::Intercepted(InputAction::Paste)),
            "cut" => Self::Change(EnvironmentChange::Intercepted(InputAction::Cut)),
            "menu" => Self::Change(EnvironmentChange::Intercepted(InputAction::ContextMenu)),
            "devtools" => Self::Change(EnvironmentChange::DevTools),
            "start" => Self::Start,
            "submit" => Self::Submit,
            "resume" => Self::Resume,
            "online" => Self::Online(true),
            "offline" => Self::Online(false),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(input)
    }
}

const HELP: &str = "\
Environment: hide, show, blur, focus, fs-enter, fs-exit, copy, paste, cut, menu, devtools
Network:     online, offline
Session:     start, submit, resume (admin), quit";

/// Run a proctored session until `quit`, end of input or Ctrl-C
///
/// # Errors
///
/// Returns an error if the store cannot be opened
pub async fn run_command(
    mut config: ProctorConfig,
    duration: Option<u32>,
    offline: bool,
) -> Result<()> {
    if let Some(duration_secs) = duration {
        config.duration_secs = duration_secs;
    }

    let db_path = config.database_path()?;
    let store = Arc::new(Database::new(&db_path).context("Failed to open proctor database")?);
    let sink = Arc::new(FileSink::new(&config.outbox_path()?));
    let env = Arc::new(SharedEnvironment::new(
        config.display(),
        config.user_agent.clone(),
    ));
    env.set_online(!offline);

    let mut proctor = Proctor::new(
        &config,
        Collaborators {
            store,
            sink: sink.clone(),
            probe: env.clone(),
            connectivity: env.clone(),
        },
    );

    let mut source = ManualSource::with_environment(env.clone());
    let subscriptions = DetectorSet::standard().attach(&mut source, &proctor.signal_sender());

    println!(
        "Proctoring attempt {} ({} channels watched)",
        config.attempt_id,
        subscriptions.len()
    );
    println!("Delivered events are spooled to {}", sink.path().display());
    println!("Type 'help' for commands.");

    let mut states = proctor.watch_state();
    let max_violations = config.max_violations;
    let notices = tokio::spawn(async move {
        let mut previous = states.borrow().clone();
        while states.changed().await.is_ok() {
            let next = states.borrow_and_update().clone();
            if let Some(notice) = describe_change(&previous, &next, max_violations) {
                println!("{notice}");
            }
            previous = next;
        }
    });

    let handle = proctor.handle();
    let duration_secs = config.duration_secs;
    let console = tokio::spawn(async move {
        if let Err(e) = read_console(&mut source, &env, &handle, duration_secs).await {
            log::error!("Console input failed: {e:#}");
        }
        handle.shutdown();
        subscriptions.detach(&mut source)
    });

    proctor.run().await?;
    console.abort();
    notices.abort();

    let state = proctor.state();
    println!(
        "\nSession {}: {} violations, {} remaining, {} unsent events",
        state.status.description(),
        state.violation_count,
        state.remaining_hms(),
        proctor.pipeline().pending_len()
    );
    Ok(())
}

/// Examinee-facing notice for a state change, if it deserves one
fn describe_change(
    previous: &SessionState,
    next: &SessionState,
    max_violations: u32,
) -> Option<String> {
    let count = next.violation_count;
    if next.status != previous.status {
        return match next.status {
            SessionStatus::Locked => Some(format!(
                "Session locked after {count}/{max_violations} violations. An administrator must resume it."
            )),
            SessionStatus::Submitted => Some(String::from("Session submitted.")),
            SessionStatus::Active if previous.status.is_terminal() => {
                Some(String::from("Session resumed by an administrator."))
            }
            SessionStatus::Active => Some(format!(
                "Session started, {} remaining.",
                next.remaining_hms()
            )),
            SessionStatus::NotStarted => None,
        };
    }
    if count > previous.violation_count {
        let remaining = next.violations_remaining(max_violations);
        if remaining <= WARNING_THRESHOLD {
            return Some(format!(
                "WARNING: violation {count}/{max_violations}. {remaining} more and the session locks."
            ));
        }
        return Some(format!("Violation {count}/{max_violations} recorded."));
    }
    None
}

async fn read_console(
    source: &mut ManualSource,
    env: &SharedEnvironment,
    handle: &ProctorHandle,
    duration_secs: u32,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(input) = ConsoleInput::parse(&line) else {
            println!("Unknown command: {}. Type 'help' for commands.", line.trim());
            continue;
        };

        match input {
            ConsoleInput::Change(change) => {
                if source.emit(change).prevent_default {
                    println!("Blocked.");
                }
            }
            ConsoleInput::Start => {
                handle.start(duration_secs);
            }
            ConsoleInput::Submit => {
                handle.submit();
            }
            ConsoleInput::Resume => {
                handle.admin_resume();
            }
            ConsoleInput::Online(online) => {
                env.set_online(online);
                println!("Network {}", if online { "online" } else { "offline" });
            }
            ConsoleInput::Help => println!("{HELP}"),
            ConsoleInput::Quit => break,
        }
    }
    Ok(())
}
