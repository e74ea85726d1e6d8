//! Livecheck command - print the upstream version a formula resolves to

use anyhow::Result;
use crossterm::style::Stylize;
use pour_core::livecheck;

use super::Context;

/// Resolve each formula and compare with what is installed.
pub async fn livecheck(ctx: &Context, formulas: &[String]) -> Result<()> {
    let pipeline = ctx.pipeline()?;
    let nw = 16;

    for arg in formulas {
        let formula = ctx.load_formula(arg)?;
        let name = formula.name();
        let resolved = pipeline.resolve(&formula).await?;
        let plan = livecheck::plan_source(&formula, &resolved)?;
        let installed = ctx.receipt(name)?;

        let mut line = format!(
            "  {}  {}",
            format!("{name:<nw$}").bold(),
            resolved.version.as_str().green()
        );
        if resolved.tag != resolved.version.as_str() {
            line.push_str(&format!(" {}", format!("({})", resolved.tag).dark_grey()));
        }
        match installed {
            Some(r) if r.version == plan.version && !plan.is_head => {
                line.push_str(&format!("  {}", "installed".dark_grey()));
            }
            Some(r) => {
                line.push_str(&format!("  {}", format!("installed {}", r.version).yellow()));
            }
            None => {}
        }
        println!("{line}");

        if let Some(newer) = &plan.outdated {
            println!(
                "    {}",
                format!(
                    "formula pins {} but upstream has {}",
                    plan.version, newer.version
                )
                .yellow()
            );
        }
    }
    Ok(())
}
