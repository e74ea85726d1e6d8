//! Install command

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use pour_core::livecheck::{self, SourcePlan};
use pour_core::{Pipeline, Reporter, ResolvedInstallation};
use pour_schema::Formula;

use super::{Context, TestsFailed};

/// Result of one formula in a batch.
#[derive(Debug)]
pub enum Outcome {
    Installed(Box<ResolvedInstallation>),
    /// The resolved version is already installed and complete.
    Current(Box<ResolvedInstallation>),
}

/// Whether `receipt` already describes what `plan` would install.
///
/// Head installs always reinstall: the branch may have moved.
pub fn is_current(receipt: &ResolvedInstallation, plan: &SourcePlan) -> bool {
    receipt.is_complete()
        && !plan.is_head
        && !receipt.is_head
        && receipt.version == plan.version
        && receipt.prefix.exists()
}

/// Install formulas given as paths or names
pub async fn install(ctx: &Context, formulas: &[String], force: bool) -> Result<()> {
    let loaded = formulas
        .iter()
        .map(|arg| ctx.load_formula(arg))
        .collect::<Result<Vec<_>>>()?;
    run_batch(ctx, loaded, force, "Installing").await
}

/// Resolve and install every formula concurrently, then report in order.
pub(crate) async fn run_batch(
    ctx: &Context,
    formulas: Vec<Formula>,
    force: bool,
    title: &str,
) -> Result<()> {
    let output = &ctx.output;
    let pipeline = Arc::new(ctx.pipeline()?);
    let start = Instant::now();

    // Two tasks on one prefix would only fight over its lock.
    let mut seen = HashSet::new();
    let formulas: Vec<Formula> = formulas
        .into_iter()
        .filter(|f| seen.insert(f.name().clone()))
        .collect();

    output.section(title);

    let mut set = tokio::task::JoinSet::new();
    for (index, formula) in formulas.iter().cloned().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        let prefix = ctx.prefix(formula.name());
        let existing = ctx.receipt(formula.name())?;
        set.spawn(async move {
            let result = install_one(&pipeline, &formula, prefix, existing, force).await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<Outcome>>> = formulas.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => output.error(&format!("Internal error: {e}")),
        }
    }

    let mut first_error: Option<anyhow::Error> = None;
    let mut installed = 0usize;
    for (formula, result) in formulas.iter().zip(results) {
        let Some(result) = result else { continue };
        let error = match result {
            Ok(Outcome::Installed(record)) => {
                installed += 1;
                if let Some(text) = &record.caveats {
                    output.caveats(&record.name, text);
                }
                record.tests_failing.then(|| {
                    anyhow::Error::new(TestsFailed {
                        name: record.name.clone(),
                    })
                    .context("Installed, but its checks fail; run `pour test` for details")
                })
            }
            Ok(Outcome::Current(record)) => {
                output.done(&record.name, &record.version, "already installed", None);
                None
            }
            Err(e) => Some(e.context(format!("Failed to install {}", formula.name()))),
        };
        if let Some(e) = error {
            if first_error.is_none() {
                first_error = Some(e);
            } else {
                output.error(&format!("{e:#}"));
            }
        }
    }

    if installed > 0 {
        output.success(&format!(
            "{installed} formula{} installed in {:.1}s",
            if installed == 1 { "" } else { "e" },
            start.elapsed().as_secs_f64()
        ));
    }
    first_error.map_or(Ok(()), Err)
}

async fn install_one(
    pipeline: &Pipeline,
    formula: &Formula,
    prefix: PathBuf,
    existing: Option<ResolvedInstallation>,
    force: bool,
) -> Result<Outcome> {
    let resolved = pipeline.resolve(formula).await?;

    if !force {
        if let Some(receipt) = existing {
            let current = livecheck::plan_source(formula, &resolved)
                .is_ok_and(|plan| is_current(&receipt, &plan));
            if current {
                tracing::debug!(name = %formula.name(), "already installed");
                return Ok(Outcome::Current(Box::new(receipt)));
            }
        }
    }

    let record = pipeline.install_resolved(formula, &resolved, &prefix).await?;
    Ok(Outcome::Installed(Box::new(record)))
}
