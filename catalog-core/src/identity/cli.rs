//! Operator credential borrowed from the Azure CLI.
//!
//! Used by the bootstrap tool, which runs interactively on an operator's
//! workstation rather than on a resource with a managed identity.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{AccessToken, TokenProvider, scope_to_resource};
use crate::cancel::cancellable;
use crate::{CatalogError, Result};

const LOCAL_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Token provider that shells out to `az account get-access-token`.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: PathBuf,
    tenant_id: Option<String>,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: PathBuf::from(if cfg!(windows) { "az.cmd" } else { "az" }),
            tenant_id: None,
        }
    }
}

impl AzureCliCredential {
    /// Creates a credential using `az` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific `az` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Requests the token from a specific tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    fn command(&self, resource: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(resource)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(tenant) = &self.tenant_id {
            command.arg("--tenant").arg(tenant);
        }
        command
    }
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    async fn acquire_token(&self, scope: &str, cancel: &CancellationToken) -> Result<AccessToken> {
        let resource = scope_to_resource(scope);
        let mut command = self.command(resource);

        tracing::debug!(program = %self.program.display(), resource, "Requesting Azure CLI token");

        cancellable("Azure CLI token acquisition", cancel, async move {
            let output = command.output().await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CatalogError::credential_unavailable_with(
                        "Azure CLI not found on PATH; install it and run 'az login'",
                        e,
                    )
                } else {
                    CatalogError::token_failed_with("Failed to run the Azure CLI", e)
                }
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let first_line = stderr.lines().next().unwrap_or_default().trim().to_string();
                return Err(if stderr.contains("az login") {
                    CatalogError::credential_unavailable(format!(
                        "Azure CLI is not signed in: {first_line}"
                    ))
                } else {
                    CatalogError::token_failed(format!(
                        "Azure CLI exited with {}: {first_line}",
                        output.status
                    ))
                });
            }

            let parsed: CliTokenResponse = serde_json::from_slice(&output.stdout)
                .map_err(|e| CatalogError::token_failed_with("Malformed Azure CLI output", e))?;
            parsed.into_access_token()
        })
        .await
    }

    fn name(&self) -> &'static str {
        "azure-cli"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    /// Local wall-clock time, always present
    expires_on: Option<String>,
    /// Epoch seconds, present on newer CLI versions
    #[serde(rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

impl CliTokenResponse {
    fn into_access_token(self) -> Result<AccessToken> {
        let expires_on = self
            .expires_on_epoch
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| self.expires_on.as_deref().and_then(parse_local_expiry))
            .ok_or_else(|| CatalogError::token_failed("Azure CLI output has no usable expiry"))?;

        Ok(AccessToken::new(self.access_token, expires_on))
    }
}

fn parse_local_expiry(text: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), LOCAL_EXPIRY_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_expiry_preferred() {
        let response: CliTokenResponse = serde_json::from_str(
            r#"{"accessToken":"abc","expiresOn":"2000-01-01 00:00:00.000000","expires_on":1700000000,"tokenType":"Bearer"}"#,
        )
        .expect("parse");
        let token = response.into_access_token().expect("token");
        assert_eq!(token.expires_on().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_local_expiry_fallback() {
        let response: CliTokenResponse = serde_json::from_str(
            r#"{"accessToken":"abc","expiresOn":"2099-01-01 12:30:00.123456"}"#,
        )
        .expect("parse");
        let token = response.into_access_token().expect("token");
        assert!(!token.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_missing_expiry_rejected() {
        let response: CliTokenResponse =
            serde_json::from_str(r#"{"accessToken":"abc"}"#).expect("parse");
        assert!(response.into_access_token().is_err());
    }

    #[tokio::test]
    async fn test_credential_unavailable_when_cli_missing() {
        let credential =
            AzureCliCredential::new().with_program("/nonexistent/path/to/az-for-tests");
        let result = credential
            .acquire_token(super::super::SQL_SCOPE, &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(CatalogError::CredentialUnavailable { .. })
        ));
    }
}
