//! Command implementations.

pub mod info;
pub mod install;
pub mod livecheck;
pub mod uninstall;
pub mod upgrade;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use pour_core::io::fetch::HttpFetcher;
use pour_core::livecheck::{HttpUpstream, ResolveError};
use pour_core::receipt::ResolvedInstallation;
use pour_core::{Layout, Pipeline, PipelineFailure};
use pour_schema::{Formula, FormulaName, ParseError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::ui::Output;

/// Exit codes shared with scripts; never renumber.
pub mod exit {
    pub const OK: u8 = 0;
    pub const OTHER: u8 = 1;
    pub const INTEGRITY: u8 = 2;
    pub const FETCH: u8 = 3;
    pub const TEST: u8 = 4;
    pub const PARSE: u8 = 5;
    pub const RESOLVE: u8 = 6;
    pub const INSTALL: u8 = 7;
}

/// Acceptance checks failed against an installed prefix.
#[derive(Error, Debug)]
#[error("checks failed for {name}")]
pub struct TestsFailed {
    pub name: FormulaName,
}

/// Map an error chain onto the stable exit codes.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(failure) = cause.downcast_ref::<PipelineFailure>() {
            return u8::try_from(failure.exit_code()).unwrap_or(exit::OTHER);
        }
        if cause.is::<ResolveError>() {
            return exit::RESOLVE;
        }
        if cause.is::<ParseError>() {
            return exit::PARSE;
        }
        if cause.is::<TestsFailed>() {
            return exit::TEST;
        }
    }
    exit::OTHER
}

/// Everything a command needs: paths, settings and output.
#[derive(Debug, Clone)]
pub struct Context {
    pub layout: Layout,
    pub settings: Settings,
    pub output: Output,
}

impl Context {
    pub fn load(quiet: bool, github_api: Option<String>) -> Result<Self> {
        let layout = Layout::from_env()
            .context("Could not determine the pour home; set POUR_HOME")?;
        let mut settings = Settings::load(&layout.config_path())?;
        if let Some(api) = github_api {
            settings.livecheck.github_api = api;
        }
        Ok(Self {
            layout,
            settings,
            output: Output::new(quiet),
        })
    }

    /// Build the install pipeline with the configured limits.
    ///
    /// Ctrl-C cancels in-flight fetches.
    pub fn pipeline(&self) -> Result<Pipeline> {
        let options = self.settings.fetch_options();
        let fetcher = HttpFetcher::new(options).context("Failed to build HTTP client")?;
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let upstream = HttpUpstream::new(client, self.settings.livecheck.github_api.clone());

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling downloads");
                on_signal.cancel();
            }
        });

        Ok(Pipeline::new(
            Arc::new(fetcher),
            Arc::new(upstream),
            Arc::new(self.output.clone()),
        )
        .with_cache(pour_core::cache::ArchiveCache::new(self.layout.cache_dir()))
        .with_retry(self.settings.retry_policy())
        .with_cancel(cancel))
    }

    /// Load a formula from a path, or by name from the formulae directory.
    pub fn load_formula(&self, arg: &str) -> Result<Formula> {
        let path = self.formula_path(arg)?;
        Formula::load(&path).with_context(|| format!("Invalid formula {}", path.display()))
    }

    fn formula_path(&self, arg: &str) -> Result<PathBuf> {
        if looks_like_path(arg) {
            return Ok(PathBuf::from(arg));
        }
        let path = self.layout.formulae_dir().join(format!("{arg}.toml"));
        if !path.exists() {
            bail!(
                "No formula named '{arg}' (looked for {}); pass a path to a .toml file",
                path.display()
            );
        }
        Ok(path)
    }

    /// Formula name for commands that accept either a name or a file.
    pub fn formula_name(&self, arg: &str) -> Result<FormulaName> {
        if looks_like_path(arg) {
            return Ok(self.load_formula(arg)?.name().clone());
        }
        FormulaName::new(arg).with_context(|| format!("Invalid formula name '{arg}'"))
    }

    pub fn prefix(&self, name: &FormulaName) -> PathBuf {
        self.layout.prefix(name.as_str())
    }

    /// The receipt for an installed formula, if any.
    pub fn receipt(&self, name: &FormulaName) -> Result<Option<ResolvedInstallation>> {
        ResolvedInstallation::load(&self.layout.receipt_path(name.as_str()))
            .with_context(|| format!("Failed to read receipt for {name}"))
    }
}

fn looks_like_path(arg: &str) -> bool {
    Path::new(arg)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
        || arg.contains(std::path::MAIN_SEPARATOR)
        || arg.contains('/')
}
