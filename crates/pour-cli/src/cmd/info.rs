//! Info command

use anyhow::Result;
use crossterm::style::Stylize;
use pour_core::Status;
use pour_schema::{LivecheckStrategy, VersionPolicy};

use super::Context;
use crate::ui::theme::format_size;

/// Show a formula's definition and, if installed, its receipt.
pub fn info(ctx: &Context, formula: &str) -> Result<()> {
    let formula = ctx.load_formula(formula)?;
    let name = formula.name();
    let installed = ctx.receipt(name)?;

    let lw = 12;

    println!();
    println!("  {}", name.as_str().white().bold());
    println!("  {}", formula.description());
    println!();
    println!("  {:<lw$}{}", "homepage", formula.homepage());
    println!("  {:<lw$}{}", "license", formula.license());
    println!("  {:<lw$}{}", "url", formula.source().url());
    if let Some(head) = formula.source().head() {
        println!("  {:<lw$}{} ({})", "head", head.url, head.branch);
    }
    let digest = formula.digest();
    if digest.is_unverified() {
        println!("  {:<lw$}{}", "digest", "unverified".yellow());
    } else {
        println!("  {:<lw$}{}", "digest", digest.to_string().dark_grey());
    }
    println!("  {:<lw$}{}", "version", describe_policy(formula.version_policy()));
    println!("  {:<lw$}{}", "installs", formula.install().entries().join(", "));
    if !formula.depends_on().is_empty() {
        let deps: Vec<&str> = formula.depends_on().iter().map(|d| d.as_str()).collect();
        println!("  {:<lw$}{}", "requires", deps.join(", "));
    }
    println!("  {:<lw$}{}", "checks", formula.test().checks().len());

    println!();
    let Some(record) = installed else {
        println!("  {:<lw$}{}", "installed", "no".dark_grey());
        return Ok(());
    };

    let dt = record.installed_at.format("%Y-%m-%d").to_string();
    println!(
        "  {:<lw$}{} ({}, {})",
        "installed",
        record.version.as_str().green(),
        format_size(record.size_bytes),
        dt
    );
    println!("  {:<lw$}{}", "prefix", record.prefix.display());
    let status = match record.status() {
        Status::Complete => "complete".to_string().green(),
        other => other.to_string().red(),
    };
    println!("  {:<lw$}{}", "status", status);
    if record.unverified {
        println!("  {:<lw$}{}", "integrity", "UNVERIFIED".yellow().bold());
    }
    if record.tests_failing {
        println!("  {:<lw$}{}", "tests", "failing".red());
    }
    if let Some(caveats) = &record.caveats {
        println!();
        for line in caveats.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

fn describe_policy(policy: &VersionPolicy) -> String {
    match policy {
        VersionPolicy::Fixed(v) => format!("fixed {v}"),
        VersionPolicy::FromUrl => "from url".to_string(),
        VersionPolicy::Livecheck(LivecheckStrategy::Regex { url, .. }) => {
            format!("livecheck regex on {url}")
        }
        VersionPolicy::Livecheck(LivecheckStrategy::LatestTag { tags_url, .. }) => {
            match tags_url {
                Some(url) => format!("livecheck latest tag from {url}"),
                None => "livecheck latest tag".to_string(),
            }
        }
        VersionPolicy::Livecheck(LivecheckStrategy::Head) => "head".to_string(),
    }
}
