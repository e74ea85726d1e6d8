//! Unified UI output interface.
//!
//! All operations are sent as events to the UI actor for sequential
//! processing. In quiet mode progress and info lines are dropped here,
//! before they reach the actor.

use std::sync::{OnceLock, mpsc};

use pour_core::Reporter;
use pour_schema::{FormulaName, Version};

use super::actor::{self, UiEvent};

/// Singleton instance of the UI actor channel.
static UI_ACTOR: OnceLock<mpsc::Sender<UiEvent>> = OnceLock::new();

/// A cloneable handle for sending UI events to the printing thread.
#[derive(Debug, Clone)]
pub struct Output {
    sender: mpsc::Sender<UiEvent>,
    quiet: bool,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self {
            sender: UI_ACTOR.get_or_init(actor::spawn).clone(),
            quiet,
        }
    }

    fn send(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }

    fn stage(&self, name: &FormulaName, version: &Version, stage: &'static str) {
        if !self.quiet {
            self.send(UiEvent::Stage {
                name: name.to_string(),
                version: version.to_string(),
                stage,
            });
        }
    }

    /// Announce an uninstall.
    pub fn removing(&self, name: &FormulaName, version: &Version) {
        self.stage(name, version, "removing");
    }

    /// Print post-install guidance; shown even in quiet mode.
    pub fn caveats(&self, name: &FormulaName, text: &str) {
        self.send(UiEvent::Caveats {
            name: name.to_string(),
            text: text.to_string(),
        });
    }

    /// Block until all pending UI events are printed.
    pub fn wait(&self) {
        let (tx, rx) = mpsc::channel();
        self.send(UiEvent::Sync(tx));
        let _ = rx.recv();
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        if !self.quiet {
            self.send(UiEvent::Section(title.to_string()));
        }
    }

    fn resolving(&self, name: &FormulaName) {
        tracing::debug!(%name, "resolving");
    }

    fn downloading(&self, name: &FormulaName, version: &Version, current: u64, total: Option<u64>) {
        if !self.quiet {
            self.send(UiEvent::Downloading {
                name: name.to_string(),
                version: version.to_string(),
                current,
                total,
            });
        }
    }

    fn verifying(&self, name: &FormulaName, version: &Version) {
        self.stage(name, version, "verifying");
    }

    fn installing(&self, name: &FormulaName, version: &Version) {
        self.stage(name, version, "installing");
    }

    fn check(&self, name: &FormulaName, check: &str, passed: bool, diagnostics: &str) {
        if passed && self.quiet {
            return;
        }
        self.send(UiEvent::Check {
            name: name.to_string(),
            check: check.to_string(),
            passed,
            diagnostics: diagnostics.to_string(),
        });
    }

    fn done(&self, name: &FormulaName, version: &Version, detail: &str, size: Option<u64>) {
        self.send(UiEvent::Done {
            name: name.to_string(),
            version: version.to_string(),
            detail: detail.to_string(),
            size,
        });
    }

    fn failed(&self, name: &FormulaName, reason: &str) {
        self.send(UiEvent::Failed {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            self.send(UiEvent::Info(msg.to_string()));
        }
    }

    fn success(&self, msg: &str) {
        self.send(UiEvent::Success(msg.to_string()));
    }

    fn warning(&self, msg: &str) {
        self.send(UiEvent::Warning(msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.send(UiEvent::Error(msg.to_string()));
    }
}
