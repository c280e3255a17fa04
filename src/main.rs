use std::io::{self, IsTerminal};
use std::panic;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::core::pipeline::orchestrator::{BatchOutcome, Orchestrator};
use crate::core::pipeline::scoreboard::Scoreboard;
use crate::discovery::SearchOptions;

mod checkers;
mod cli;
mod constants;
mod core;
mod discovery;
mod native;
#[cfg(feature = "portable")]
mod portable;
mod samplers;
#[cfg(test)]
mod stubs;

/// Exit status when the batch could not be run at all.
const FATAL_EXIT_CODE: i32 = 1;

#[tokio::main]
#[tracing::instrument]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(io::stderr)
        .init();
    set_panic_hook();

    let code = match run(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            FATAL_EXIT_CODE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<BatchOutcome, Box<dyn std::error::Error>> {
    let config = cli.batch_config();
    let cases = discovery::find(
        &cli.test_data_dir,
        SearchOptions {
            examples_only: cli.examples_only,
            task: cli.task.as_deref(),
            executable: &cli.executable,
        },
    )?;
    let sampler = samplers::select(cli.sampler)?;
    tracing::info!(
        "Running {} test cases, {} in parallel",
        cases.len(),
        config.budget.parallelism
    );

    let stdout = io::stdout();
    let live = stdout.is_terminal();
    let mut board = Scoreboard::new(stdout, &cases, live, cli.color.enabled(live));
    let batch = Orchestrator::new(config, sampler, cli.checker.build()).submit_all(cases);

    Ok(batch.report(&mut board, interrupted()).await?)
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
