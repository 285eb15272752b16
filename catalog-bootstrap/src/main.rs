//! Role bootstrap tool.
//!
//! Exit codes: 0 on success (including `--help` and `--version`), 1 on any
//! argument, credential or SQL failure.

use catalog_bootstrap::{Cli, run};
use catalog_core::{LogFormat, init_logging};
use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            e.print().ok();
            return code;
        }
    };

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet, LogFormat::Text) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match run(&cli, &cancel).await {
        Ok(report) => {
            if report.is_noop() {
                tracing::info!("No changes were needed");
            }
            println!("SQL bootstrap completed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
