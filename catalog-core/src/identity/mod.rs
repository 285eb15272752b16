//! Token acquisition for the Azure SQL resource.
//!
//! The catalog never authenticates with a username and password. Each
//! connection open asks a [`TokenProvider`] for a fresh bearer token scoped to
//! [`SQL_SCOPE`]; tokens are not cached between connections.
//!
//! Two providers exist:
//! - [`ManagedIdentityCredential`] talks to the platform identity endpoint
//!   (App Service or instance metadata) for the system-assigned identity or a
//!   user-assigned identity selected by client id.
//! - [`AzureCliCredential`] borrows the signed-in operator's token from the
//!   Azure CLI and is used by the bootstrap tool.

mod cli;
mod managed;

pub use cli::AzureCliCredential;
pub use managed::{IdentityEndpoint, ManagedIdentityCredential};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::Result;

/// Fixed OAuth scope of the Azure SQL resource.
pub const SQL_SCOPE: &str = "https://database.windows.net//.default";

/// Converts a v2 scope (`<resource>/.default`) into the v1 resource value the
/// identity endpoints expect.
///
/// ```rust
/// use catalog_core::identity::{scope_to_resource, SQL_SCOPE};
///
/// assert_eq!(scope_to_resource(SQL_SCOPE), "https://database.windows.net/");
/// ```
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Which managed identity the process authenticates as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// The identity bound to the hosting resource
    SystemAssigned,
    /// A standalone identity selected by its client id
    UserAssigned {
        /// Client (application) id of the user-assigned identity
        client_id: String,
    },
}

impl IdentityMode {
    /// Resolves the mode from the optional configured client id.
    ///
    /// Absent or blank values select the system-assigned identity.
    pub fn resolve(user_assigned_client_id: Option<&str>) -> Self {
        match user_assigned_client_id.map(str::trim) {
            Some(client_id) if !client_id.is_empty() => Self::UserAssigned {
                client_id: client_id.to_string(),
            },
            _ => Self::SystemAssigned,
        }
    }

    /// Display label used by the presentation layer.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SystemAssigned => "System-assigned",
            Self::UserAssigned { .. } => "User-assigned",
        }
    }

    /// Client id for user-assigned mode.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            Self::SystemAssigned => None,
            Self::UserAssigned { client_id } => Some(client_id),
        }
    }
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bearer token for one connection.
///
/// # Security
/// The token value is zeroized on drop and redacted from `Debug` output.
#[derive(Clone)]
pub struct AccessToken {
    secret: Zeroizing<String>,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Wraps a raw token value.
    pub fn new(secret: String, expires_on: DateTime<Utc>) -> Self {
        Self {
            secret: Zeroizing::new(secret),
            expires_on,
        }
    }

    /// The raw token, for attaching to a TDS login only.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Expiry instant reported by the issuer.
    pub const fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    /// True when the token is no longer valid at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on <= now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of bearer tokens.
///
/// Implementations perform at most one network call (or process spawn) per
/// invocation and do not retry. They must observe `cancel` and return
/// [`crate::CatalogError::Cancelled`] when it fires.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Requests a token for `scope`.
    ///
    /// # Errors
    /// - `CredentialUnavailable` when no identity is reachable
    /// - `TokenAcquisitionFailed` on transport or issuer errors
    /// - `Cancelled` when `cancel` fires first
    async fn acquire_token(&self, scope: &str, cancel: &CancellationToken) -> Result<AccessToken>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Builds the managed identity credential for `mode` from the process
/// environment.
pub fn credential_for(mode: &IdentityMode) -> Result<Arc<dyn TokenProvider>> {
    let credential = ManagedIdentityCredential::from_env(mode.clone())?;
    Ok(Arc::new(credential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_absent_client_id_is_system_assigned() {
        assert_eq!(IdentityMode::resolve(None), IdentityMode::SystemAssigned);
        assert_eq!(IdentityMode::resolve(Some("")), IdentityMode::SystemAssigned);
        assert_eq!(
            IdentityMode::resolve(Some("   ")),
            IdentityMode::SystemAssigned
        );
    }

    #[test]
    fn test_client_id_is_user_assigned() {
        let mode = IdentityMode::resolve(Some(" 00000000-0000-0000-0000-000000000001 "));
        assert_eq!(
            mode.client_id(),
            Some("00000000-0000-0000-0000-000000000001")
        );
        assert_eq!(mode.label(), "User-assigned");
    }

    #[test]
    fn test_token_debug_redacts_secret() {
        let token = AccessToken::new("eyJ0eXAiOiJKV1Qi".to_string(), Utc::now());
        let debug = format!("{token:?}");
        assert!(!debug.contains("eyJ0eXAiOiJKV1Qi"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let token = AccessToken::new("t".to_string(), now);
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_scope_to_resource_passthrough() {
        assert_eq!(
            scope_to_resource("https://vault.azure.net"),
            "https://vault.azure.net"
        );
    }

    proptest! {
        #[test]
        fn prop_blank_client_ids_resolve_to_system_assigned(ws in "[ \t\r\n]{0,8}") {
            prop_assert_eq!(IdentityMode::resolve(Some(&ws)), IdentityMode::SystemAssigned);
        }

        #[test]
        fn prop_non_blank_client_ids_resolve_to_user_assigned(id in "[A-Za-z0-9-]{1,36}") {
            let mode = IdentityMode::resolve(Some(&id));
            prop_assert_eq!(mode.client_id(), Some(id.as_str()));
        }
    }
}
