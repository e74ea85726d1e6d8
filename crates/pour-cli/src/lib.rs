//! pour - install developer tools from formula files
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! A formula is a TOML file describing where a tool's source archive lives,
//! how to verify it, which directories to keep and how to check the result.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.pour/
//! ├── opt/            # One prefix per formula, plus <name>.receipt.json
//! ├── cache/          # Verified archives, <name>--<version>
//! ├── formulae/       # Formulas looked up by name
//! └── config.toml     # Optional settings
//! ```

pub mod cmd;
pub mod config;
pub mod ui;

pub use pour_core::USER_AGENT;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pour")]
#[command(author, version, about = "pour - install developer tools from formula files")]
pub struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// GitHub API base used to list tags
    #[arg(long, global = true, env = "POUR_GITHUB_API", hide = true)]
    pub github_api: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install one or more formulas
    Install {
        /// Formula file (.toml) or name under ~/.pour/formulae
        #[arg(required = true)]
        formulas: Vec<String>,
        /// Reinstall even if the resolved version is already installed
        #[arg(short, long)]
        force: bool,
    },
    /// Re-resolve and install newer versions
    Upgrade {
        #[arg(required = true)]
        formulas: Vec<String>,
    },
    /// Remove installed formulas
    Uninstall {
        #[arg(required = true)]
        formulas: Vec<String>,
    },
    /// Run a formula's checks against its installed prefix
    Test { formula: String },
    /// Show formula metadata and installation state
    Info { formula: String },
    /// Print the upstream version a formula would install
    Livecheck {
        #[arg(required = true)]
        formulas: Vec<String>,
    },
}
