//! Installation records.
//!
//! A [`ResolvedInstallation`] is created for every install attempt and walks
//! forward through the pipeline stages. Once an attempt has changed the
//! prefix its record is persisted next to it as a receipt, which later
//! drives upgrades, tests and clean uninstalls.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pour_schema::{FormulaName, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("IO error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Corrupt receipt {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid status transition from {from} to {to}")]
    Transition { from: String, to: String },
}

/// Pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Fetch,
    Verify,
    Install,
    Test,
    Caveats,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Install => "install",
            Self::Test => "test",
            Self::Caveats => "caveats",
        })
    }
}

/// Lifecycle of one install attempt.
///
/// `Pending → Fetched → Verified → Installed → Tested → Complete`, or
/// `Failed` from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Fetched,
    Verified,
    Installed,
    Tested,
    Complete,
    Failed { stage: Stage, reason: String },
}

impl Status {
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Fetched => Some(1),
            Self::Verified => Some(2),
            Self::Installed => Some(3),
            Self::Tested => Some(4),
            Self::Complete => Some(5),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fetched => f.write_str("fetched"),
            Self::Verified => f.write_str("verified"),
            Self::Installed => f.write_str("installed"),
            Self::Tested => f.write_str("tested"),
            Self::Complete => f.write_str("complete"),
            Self::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

/// Everything known about one install attempt.
///
/// The formula itself is never modified; all resolution results live here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInstallation {
    pub name: FormulaName,
    pub version: Version,
    /// Upstream tag (or branch, for head installs).
    pub tag: String,
    #[serde(default)]
    pub is_head: bool,
    pub url: String,
    /// `algo:hex` of the fetched archive, once verified.
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub unverified: bool,
    pub prefix: PathBuf,
    pub installed_at: DateTime<Utc>,
    status: Status,
    #[serde(default)]
    pub tests_failing: bool,
    #[serde(default)]
    pub entries: Vec<String>,
    /// Staged files, relative to the prefix.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub caveats: Option<String>,
}

impl ResolvedInstallation {
    /// Start a fresh record in `Pending`.
    pub fn new(
        name: FormulaName,
        version: Version,
        tag: String,
        url: String,
        prefix: PathBuf,
    ) -> Self {
        Self {
            name,
            version,
            tag,
            is_head: false,
            url,
            digest: None,
            unverified: false,
            prefix,
            installed_at: Utc::now(),
            status: Status::Pending,
            tests_failing: false,
            entries: Vec::new(),
            files: Vec::new(),
            size_bytes: 0,
            caveats: None,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == Status::Complete
    }

    /// Move to the next stage. Only single forward steps are accepted.
    pub fn advance(&mut self, next: Status) -> Result<(), ReceiptError> {
        let allowed = match (self.status.rank(), next.rank()) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        };
        if !allowed {
            return Err(ReceiptError::Transition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(name = %self.name, from = %self.status, to = %next, "status");
        self.status = next;
        Ok(())
    }

    /// Mark the attempt as failed. A terminal record keeps its status.
    pub fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = Status::Failed {
            stage,
            reason: reason.into(),
        };
    }

    /// Load the receipt at `path`, if one exists.
    pub fn load(path: &Path) -> Result<Option<Self>, ReceiptError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ReceiptError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ReceiptError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write the receipt atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), ReceiptError> {
        let io_err = |source| ReceiptError::Io {
            path: path.to_path_buf(),
            source,
        };
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(self).map_err(|source| ReceiptError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Receipt location for a prefix: `<prefix>.receipt.json` as a sibling.
pub fn receipt_path(prefix: &Path) -> PathBuf {
    let name = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    prefix.with_file_name(format!("{name}.receipt.json"))
}

/// Remove a receipt; a missing one is fine.
pub fn remove(path: &Path) -> Result<(), ReceiptError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ReceiptError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
