//! pour - install developer tools from formula files

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use crossterm::style::Stylize;
use tracing_subscriber::EnvFilter;

use pour_cli::cmd::{self, Context, exit};
use pour_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit 1; code 2 belongs to integrity failures.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(exit::OTHER)
            } else {
                ExitCode::from(exit::OK)
            };
        }
    };

    let ctx = match Context::load(cli.quiet, cli.github_api.clone()) {
        Ok(ctx) => ctx,
        Err(e) => return report(&e),
    };

    let result = run(&ctx, cli.command).await;
    ctx.output.wait();
    match result {
        Ok(()) => ExitCode::from(exit::OK),
        Err(e) => report(&e),
    }
}

async fn run(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Install { formulas, force } => cmd::install::install(ctx, &formulas, force).await,
        Commands::Upgrade { formulas } => cmd::upgrade::upgrade(ctx, &formulas).await,
        Commands::Uninstall { formulas } => cmd::uninstall::uninstall(ctx, &formulas),
        Commands::Test { formula } => cmd::test::test(ctx, &formula).await,
        Commands::Info { formula } => cmd::info::info(ctx, &formula),
        Commands::Livecheck { formulas } => cmd::livecheck::livecheck(ctx, &formulas).await,
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("{} {err:#}", "error:".red().bold());
    ExitCode::from(cmd::exit_code(err))
}
