//! Azure CLI credential against fake `az` executables.
#![cfg(unix)]

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use catalog_core::CatalogError;
use catalog_core::identity::{AzureCliCredential, SQL_SCOPE, TokenProvider};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Writes an executable shell script named `az` into a fresh directory.
fn fake_az(body: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("az");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
}

#[tokio::test]
async fn test_token_parsed_from_cli_output() {
    let (_dir, az) = fake_az(
        r#"
case "$*" in
  *"--resource https://database.windows.net/"*) ;;
  *) echo "unexpected arguments: $*" >&2; exit 2 ;;
esac
echo '{"accessToken":"cli-token","expiresOn":"2100-01-01 00:00:00.000000","expires_on":4102444800,"tokenType":"Bearer"}'
"#,
    );

    let credential = AzureCliCredential::new().with_program(&az);
    let token = credential
        .acquire_token(SQL_SCOPE, &CancellationToken::new())
        .await
        .expect("token");
    assert_eq!(token.secret(), "cli-token");
    assert_eq!(token.expires_on().timestamp(), 4_102_444_800);
}

#[tokio::test]
async fn test_tenant_is_forwarded() {
    let (_dir, az) = fake_az(
        r#"
case "$*" in
  *"--tenant contoso.onmicrosoft.com"*) ;;
  *) echo "missing tenant" >&2; exit 2 ;;
esac
echo '{"accessToken":"tenant-token","expires_on":4102444800}'
"#,
    );

    let credential = AzureCliCredential::new()
        .with_program(&az)
        .with_tenant("contoso.onmicrosoft.com");
    let token = credential
        .acquire_token(SQL_SCOPE, &CancellationToken::new())
        .await
        .expect("token");
    assert_eq!(token.secret(), "tenant-token");
}

#[tokio::test]
async fn test_signed_out_cli_is_credential_unavailable() {
    let (_dir, az) = fake_az(
        r#"echo "ERROR: Please run 'az login' to setup account." >&2; exit 1"#,
    );

    let error = AzureCliCredential::new()
        .with_program(&az)
        .acquire_token(SQL_SCOPE, &CancellationToken::new())
        .await
        .expect_err("signed out");
    assert!(matches!(error, CatalogError::CredentialUnavailable { .. }));
}

#[tokio::test]
async fn test_other_cli_failure_is_token_acquisition_failure() {
    let (_dir, az) = fake_az(r#"echo "ERROR: AADSTS50076 MFA required" >&2; exit 1"#);

    let error = AzureCliCredential::new()
        .with_program(&az)
        .acquire_token(SQL_SCOPE, &CancellationToken::new())
        .await
        .expect_err("failed");
    assert!(matches!(error, CatalogError::TokenAcquisitionFailed { .. }));
    assert!(error.to_string().contains("AADSTS50076"));
}

#[tokio::test]
async fn test_garbage_output_is_token_acquisition_failure() {
    let (_dir, az) = fake_az(r#"echo "not json""#);

    let error = AzureCliCredential::new()
        .with_program(&az)
        .acquire_token(SQL_SCOPE, &CancellationToken::new())
        .await
        .expect_err("garbage");
    assert!(matches!(error, CatalogError::TokenAcquisitionFailed { .. }));
}

#[tokio::test]
async fn test_cancellation_stops_hung_cli() {
    let (_dir, az) = fake_az("sleep 30");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let error = AzureCliCredential::new()
        .with_program(&az)
        .acquire_token(SQL_SCOPE, &cancel)
        .await
        .expect_err("cancelled");
    assert!(error.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
}
