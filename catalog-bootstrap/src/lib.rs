//! Role bootstrap command line.
//!
//! Grants a database role SELECT on a schema and maps managed identities
//! into it as external users. Runs as the signed-in Azure CLI operator by
//! default, since the identities being mapped cannot grant themselves access.

use anyhow::bail;
use catalog_core::bootstrap::{
    BootstrapReport, BootstrapRequest, DEFAULT_ROLE, DEFAULT_SCHEMA, PrincipalKind,
    RoleBootstrapper,
};
use catalog_core::identity::{AzureCliCredential, TokenProvider, credential_for};
use catalog_core::{ConnectionFactory, ConnectionParameters, IdentityMode};
use clap::{Args, Parser, ValueEnum};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where the operator token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CredentialSource {
    /// `az account get-access-token` for the signed-in user
    #[default]
    AzureCli,
    /// The managed identity of the machine running the tool
    ManagedIdentity,
}

/// Command line of `catalog-bootstrap`.
#[derive(Debug, Parser)]
#[command(name = "catalog-bootstrap")]
#[command(about = "Grant a database role read access and map managed identities into it")]
#[command(version)]
#[command(long_about = "
Catalog Bootstrap - one-shot Azure SQL role setup

Creates the role if missing, grants it SELECT on the schema, creates an
external user for each managed identity and adds it to the role. Running it
again against a provisioned database changes nothing.

The operator must be an Azure AD admin of the SQL server (or hold
equivalent permissions in the database).

EXAMPLES:
  catalog-bootstrap --server demo.database.windows.net --database catalog \\
      --systemAssigned app-catalog-prod
  catalog-bootstrap --server demo.database.windows.net --database catalog \\
      --role catalog_reader --schema SalesLT --userAssigned uami-catalog
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Target server (required)
    #[arg(long, value_name = "HOST", help = "SQL server host name (required)")]
    pub server: Option<String>,

    /// Target database (required)
    #[arg(long, value_name = "NAME", help = "Database name (required)")]
    pub database: Option<String>,

    /// Role to create and grant
    #[arg(long, value_name = "NAME", default_value = DEFAULT_ROLE)]
    pub role: String,

    /// Schema the role may read
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SCHEMA)]
    pub schema: String,

    /// System-assigned identity display names
    #[arg(
        long = "systemAssigned",
        value_name = "PRINCIPAL",
        help = "Display name of a system-assigned identity (repeatable)"
    )]
    pub system_assigned: Vec<String>,

    /// User-assigned identity display names
    #[arg(
        long = "userAssigned",
        value_name = "PRINCIPAL",
        help = "Display name of a user-assigned identity (repeatable)"
    )]
    pub user_assigned: Vec<String>,

    /// Operator credential
    #[arg(long, value_enum, default_value_t = CredentialSource::AzureCli)]
    pub credential: CredentialSource,

    /// Client id of a user-assigned identity when `--credential managed-identity`
    #[arg(long, value_name = "ID")]
    pub client_id: Option<String>,
}

/// Flags shared with the other catalog binaries.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

impl Cli {
    /// Bootstrap request from the flags. Blank role or schema values fall
    /// back to the defaults; blank principal names are skipped.
    pub fn request(&self) -> BootstrapRequest {
        let role = non_blank(Some(&self.role)).unwrap_or(DEFAULT_ROLE);
        let schema = non_blank(Some(&self.schema)).unwrap_or(DEFAULT_SCHEMA);

        let system = self
            .system_assigned
            .iter()
            .map(|name| (name, PrincipalKind::SystemAssigned));
        let user = self
            .user_assigned
            .iter()
            .map(|name| (name, PrincipalKind::UserAssigned));

        system
            .chain(user)
            .filter_map(|(name, kind)| non_blank(Some(name)).map(|n| (n, kind)))
            .fold(BootstrapRequest::new(role, schema), |request, (name, kind)| {
                request.with_principal(name, kind)
            })
    }

    /// Token provider selected by `--credential`.
    ///
    /// # Errors
    /// Fails when the managed identity endpoint is misconfigured.
    pub fn token_provider(&self) -> anyhow::Result<Arc<dyn TokenProvider>> {
        Ok(match self.credential {
            CredentialSource::AzureCli => Arc::new(AzureCliCredential::new()),
            CredentialSource::ManagedIdentity => {
                credential_for(&IdentityMode::resolve(self.client_id.as_deref()))?
            }
        })
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn required<'a>(name: &str, value: Option<&'a String>) -> anyhow::Result<&'a str> {
    match non_blank(value) {
        Some(value) => Ok(value),
        None => bail!("Missing required argument: --{name}"),
    }
}

/// Validates the flags and runs the bootstrap.
///
/// # Errors
/// Missing arguments, credential, connection and SQL failures, or
/// cancellation.
pub async fn run(cli: &Cli, cancel: &CancellationToken) -> anyhow::Result<BootstrapReport> {
    let server = required("server", cli.server.as_ref())?;
    let database = required("database", cli.database.as_ref())?;

    let request = cli.request();
    request.validate()?;

    let params = ConnectionParameters::new(server, database)?;
    let factory = ConnectionFactory::new(params, cli.token_provider()?);

    tracing::info!(
        credential = ?cli.credential,
        server = %factory.parameters(),
        "Bootstrapping role access"
    );

    let report = RoleBootstrapper::new(factory).run(&request, cancel).await?;
    for step in &report.applied {
        tracing::info!(%step, "Applied");
    }
    Ok(report)
}
