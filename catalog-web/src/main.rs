//! Product catalog web service.
//!
//! Serves the read-only catalog API over Azure SQL, authenticating as the
//! process's managed identity.
//!
//! # Security Guarantees
//! - No database credentials in configuration; tokens only
//! - Tokens are never logged
//! - Clients see short hints, never raw errors or connection details

use anyhow::Context;
use catalog_core::{
    CatalogRepository, CatalogSettings, ConnectionFactory, LogFormat, init_logging,
};
use catalog_web::{AppState, router};
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "catalog-web")]
#[command(about = "Read-only product catalog backed by Azure SQL")]
#[command(version)]
#[command(long_about = "
Catalog Web - product catalog over Azure SQL with managed identity

Settings come from an optional TOML file and CATALOG_* environment
variables (CATALOG_SQL__SERVER, CATALOG_SQL__DATABASE,
CATALOG_MANAGED_IDENTITY__USER_ASSIGNED_CLIENT_ID, CATALOG_WEB__BIND).

EXAMPLES:
  CATALOG_SQL__SERVER=demo.database.windows.net CATALOG_SQL__DATABASE=catalog catalog-web
  catalog-web --config catalog.toml --log-format json
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Settings file
    #[arg(long, env = "CATALOG_CONFIG", help = "Path to a TOML settings file")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())?;

    let settings = CatalogSettings::load(cli.config.as_deref())?;
    let identity = settings.identity_mode();
    let params = settings.connection_parameters()?;
    let factory = ConnectionFactory::for_identity(params, &identity)?;

    info!(
        identity = %identity,
        connection = %factory.descriptor(),
        "Starting catalog web service"
    );

    let state = AppState {
        repository: CatalogRepository::new(factory),
        identity,
        take: settings.web.take,
    };

    let addr = settings.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
