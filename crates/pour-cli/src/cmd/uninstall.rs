//! Uninstall command

use anyhow::{Context as _, Result, bail};
use pour_core::Reporter;
use pour_core::install::{self, PrefixLock};
use pour_core::receipt;

use super::Context;

/// Remove installed formulas and their receipts.
pub fn uninstall(ctx: &Context, formulas: &[String]) -> Result<()> {
    let output = &ctx.output;
    let names = formulas
        .iter()
        .map(|arg| ctx.formula_name(arg))
        .collect::<Result<Vec<_>>>()?;

    output.section("Removing");
    for name in &names {
        let prefix = ctx.prefix(name);
        // The prefix and its receipt go away together.
        let lock = PrefixLock::acquire(&prefix)
            .with_context(|| format!("Failed to lock {}", prefix.display()))?;
        let Some(record) = ctx.receipt(name)? else {
            bail!("{name} is not installed");
        };
        output.removing(name, &record.version);

        install::uninstall(&prefix, &record.files, &lock)
            .with_context(|| format!("Failed to remove {}", prefix.display()))?;
        receipt::remove(&ctx.layout.receipt_path(name.as_str()))?;
        drop(lock);

        output.done(name, &record.version, "removed", Some(record.size_bytes));
    }
    Ok(())
}
