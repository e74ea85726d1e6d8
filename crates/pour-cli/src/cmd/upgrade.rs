//! Upgrade command - re-resolve installed formulas and install newer versions

use anyhow::{Result, bail};

use super::Context;
use super::install::run_batch;

/// Upgrade installed formulas. Already current ones are left alone.
pub async fn upgrade(ctx: &Context, formulas: &[String]) -> Result<()> {
    let mut loaded = Vec::with_capacity(formulas.len());
    for arg in formulas {
        let formula = ctx.load_formula(arg)?;
        if ctx.receipt(formula.name())?.is_none() {
            bail!(
                "{} is not installed; use `pour install {arg}`",
                formula.name()
            );
        }
        loaded.push(formula);
    }
    run_batch(ctx, loaded, false, "Upgrading").await
}
