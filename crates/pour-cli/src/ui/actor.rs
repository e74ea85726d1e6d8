//! UI Actor - single-threaded event printing
//!
//! Every line goes through one thread, so output from parallel installs
//! stays in order and never tears.

use std::collections::HashSet;
use std::sync::mpsc;
use std::thread;

use crossterm::style::Stylize;

use super::theme::{Theme, format_size};

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// Print a section header
    Section(String),
    /// Download progress for a formula
    Downloading {
        name: String,
        version: String,
        current: u64,
        total: Option<u64>,
    },
    /// A pipeline stage started for a formula
    Stage {
        name: String,
        version: String,
        stage: &'static str,
    },
    /// One acceptance check finished
    Check {
        name: String,
        check: String,
        passed: bool,
        diagnostics: String,
    },
    /// A formula finished successfully
    Done {
        name: String,
        version: String,
        detail: String,
        size: Option<u64>,
    },
    /// A formula failed
    Failed { name: String, reason: String },
    /// Post-install guidance for a formula
    Caveats { name: String, text: String },
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
    /// Acknowledge once every earlier event has been printed
    Sync(mpsc::Sender<()>),
}

/// Spawn the printing thread and return its sender.
pub fn spawn() -> mpsc::Sender<UiEvent> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || run_event_loop(&receiver));
    sender
}

fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>) {
    let theme = Theme::default();
    let nw = theme.name_width;
    let vw = theme.version_width;
    // Downloads report every chunk; print each one once.
    let mut started: HashSet<(String, String)> = HashSet::new();

    while let Ok(event) = receiver.recv() {
        match event {
            UiEvent::Section(title) => {
                println!();
                println!("{} {}", title.bold(), "─".repeat(40).dark_grey());
            }
            UiEvent::Downloading {
                name,
                version,
                current,
                total,
            } => {
                if current == 0 && started.insert((name.clone(), version.clone())) {
                    let size = total.map(format_size).unwrap_or_default();
                    println!(
                        "  {} {:<nw$}  {}  {} {}",
                        theme.icons.active.cyan(),
                        name,
                        format!("{version:<vw$}").dark_grey(),
                        "downloading".dark_grey(),
                        size.dark_grey()
                    );
                }
            }
            UiEvent::Stage {
                name,
                version,
                stage,
            } => {
                println!(
                    "  {} {:<nw$}  {}  {}",
                    theme.icons.active.cyan(),
                    name,
                    format!("{version:<vw$}").dark_grey(),
                    stage.dark_grey()
                );
            }
            UiEvent::Check {
                name,
                check,
                passed,
                diagnostics,
            } => {
                let icon = if passed {
                    theme.icons.success.green()
                } else {
                    theme.icons.error.red()
                };
                println!("    {icon} {} {}", name.as_str().dark_grey(), check);
                for line in diagnostics.lines() {
                    println!("        {}", line.dark_grey());
                }
            }
            UiEvent::Done {
                name,
                version,
                detail,
                size,
            } => {
                let size = size.map(format_size).unwrap_or_default();
                println!(
                    "  {} {}  {:<vw$}  {}  {}",
                    theme.icons.success.green(),
                    format!("{name:<nw$}").bold(),
                    version,
                    detail.green(),
                    size.dark_grey()
                );
            }
            UiEvent::Failed { name, reason } => {
                eprintln!(
                    "  {} {}  {}",
                    theme.icons.error.red(),
                    format!("{name:<nw$}").bold(),
                    reason.red()
                );
            }
            UiEvent::Caveats { name, text } => {
                println!();
                println!("{} {}", "Caveats".bold(), name.as_str().dark_grey());
                for line in text.lines() {
                    println!("  {line}");
                }
            }
            UiEvent::Info(msg) => println!("  {} {}", theme.icons.info, msg),
            UiEvent::Success(msg) => println!("{} {}", theme.icons.success.green(), msg.green()),
            UiEvent::Warning(msg) => {
                eprintln!("{} {}", theme.icons.warning.yellow(), msg.yellow());
            }
            UiEvent::Error(msg) => eprintln!("{} {}", theme.icons.error.red(), msg.red()),
            UiEvent::Sync(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
