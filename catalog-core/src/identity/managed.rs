//! Managed identity credential backed by the platform identity endpoint.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use zeroize::Zeroizing;

use super::{AccessToken, IdentityMode, TokenProvider, scope_to_resource};
use crate::cancel::cancellable;
use crate::{CatalogError, Result};

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const APP_SERVICE_DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S %z";

/// Probe budget for reaching the endpoint at all; a miss means no identity.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where tokens are requested from.
#[derive(Clone)]
pub enum IdentityEndpoint {
    /// App Service / Functions local identity endpoint
    AppService {
        /// Value of `IDENTITY_ENDPOINT`
        endpoint: Url,
        /// Value of `IDENTITY_HEADER`, sent as `X-IDENTITY-HEADER`
        secret_header: Zeroizing<String>,
    },
    /// Azure instance metadata service (VMs, scale sets, containers)
    Imds {
        /// Token endpoint URL
        endpoint: Url,
    },
}

impl IdentityEndpoint {
    /// Instance metadata endpoint at `endpoint`.
    pub const fn imds(endpoint: Url) -> Self {
        Self::Imds { endpoint }
    }

    /// App Service endpoint with its per-process secret header.
    pub fn app_service(endpoint: Url, secret_header: String) -> Self {
        Self::AppService {
            endpoint,
            secret_header: Zeroizing::new(secret_header),
        }
    }

    /// Picks the endpoint from `IDENTITY_ENDPOINT` / `IDENTITY_HEADER`,
    /// falling back to instance metadata.
    ///
    /// # Errors
    /// Returns a configuration error when `IDENTITY_ENDPOINT` is not a URL.
    pub fn detect<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("IDENTITY_ENDPOINT").filter(|v| !v.trim().is_empty());
        let header = lookup("IDENTITY_HEADER").filter(|v| !v.trim().is_empty());

        match (endpoint, header) {
            (Some(endpoint), Some(header)) => {
                let endpoint = Url::parse(endpoint.trim()).map_err(|e| {
                    CatalogError::configuration(format!("IDENTITY_ENDPOINT is not a valid URL: {e}"))
                })?;
                Ok(Self::app_service(endpoint, header))
            }
            _ => {
                let endpoint = Url::parse(IMDS_ENDPOINT).map_err(|e| {
                    CatalogError::configuration(format!("Invalid IMDS endpoint: {e}"))
                })?;
                Ok(Self::imds(endpoint))
            }
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::AppService { .. } => "app-service",
            Self::Imds { .. } => "imds",
        }
    }
}

impl fmt::Debug for IdentityEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppService { endpoint, .. } => f
                .debug_struct("AppService")
                .field("endpoint", &endpoint.as_str())
                .field("secret_header", &"<redacted>")
                .finish(),
            Self::Imds { endpoint } => f
                .debug_struct("Imds")
                .field("endpoint", &endpoint.as_str())
                .finish(),
        }
    }
}

/// Token provider for system- or user-assigned managed identities.
///
/// # Example
/// ```rust,no_run
/// use catalog_core::identity::{IdentityMode, ManagedIdentityCredential, TokenProvider, SQL_SCOPE};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> catalog_core::Result<()> {
/// let credential = ManagedIdentityCredential::from_env(IdentityMode::SystemAssigned)?;
/// let token = credential.acquire_token(SQL_SCOPE, &CancellationToken::new()).await?;
/// println!("token valid until {}", token.expires_on());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    mode: IdentityMode,
    endpoint: IdentityEndpoint,
    http: reqwest::Client,
}

impl ManagedIdentityCredential {
    /// Creates a credential for `mode` against an explicit endpoint.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(mode: IdentityMode, endpoint: IdentityEndpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                CatalogError::configuration(format!("Failed to build identity HTTP client: {e}"))
            })?;

        Ok(Self {
            mode,
            endpoint,
            http,
        })
    }

    /// Creates a credential for `mode`, detecting the endpoint from the
    /// process environment.
    ///
    /// # Errors
    /// Returns a configuration error for a malformed `IDENTITY_ENDPOINT`.
    pub fn from_env(mode: IdentityMode) -> Result<Self> {
        let endpoint = IdentityEndpoint::detect(|key| std::env::var(key).ok())?;
        Self::new(mode, endpoint)
    }

    /// The identity this credential authenticates as.
    pub const fn mode(&self) -> &IdentityMode {
        &self.mode
    }

    /// The endpoint tokens are requested from.
    pub const fn endpoint(&self) -> &IdentityEndpoint {
        &self.endpoint
    }

    fn request(&self, resource: &str) -> reqwest::RequestBuilder {
        let builder = match &self.endpoint {
            IdentityEndpoint::AppService {
                endpoint,
                secret_header,
            } => self
                .http
                .get(endpoint.clone())
                .query(&[
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", resource),
                ])
                .header("X-IDENTITY-HEADER", secret_header.as_str()),
            IdentityEndpoint::Imds { endpoint } => self
                .http
                .get(endpoint.clone())
                .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)])
                .header("Metadata", "true"),
        };

        match self.mode.client_id() {
            Some(client_id) => builder.query(&[("client_id", client_id)]),
            None => builder,
        }
    }

    fn classify_send_error(&self, error: reqwest::Error) -> CatalogError {
        if error.is_connect() || (error.is_timeout() && !error.is_body()) {
            CatalogError::credential_unavailable_with(
                format!(
                    "{} identity endpoint is unreachable; no managed identity available",
                    self.endpoint.kind()
                ),
                error,
            )
        } else {
            CatalogError::token_failed_with(
                format!("{} identity endpoint request failed", self.endpoint.kind()),
                error,
            )
        }
    }

    fn classify_status(&self, status: reqwest::StatusCode, body: &str) -> CatalogError {
        let detail = serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.error_description.or(e.error).or(e.message))
            .unwrap_or_default();

        let context = format!(
            "{} identity endpoint returned {} for {} identity{}",
            self.endpoint.kind(),
            status.as_u16(),
            self.mode.label(),
            if detail.is_empty() {
                String::new()
            } else {
                format!(": {detail}")
            }
        );

        if status == reqwest::StatusCode::BAD_REQUEST {
            // Identity not assigned to this resource, or unknown client id.
            CatalogError::credential_unavailable(context)
        } else {
            CatalogError::token_failed(context)
        }
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    async fn acquire_token(&self, scope: &str, cancel: &CancellationToken) -> Result<AccessToken> {
        let resource = scope_to_resource(scope);
        let request = self.request(resource);

        tracing::debug!(
            endpoint = self.endpoint.kind(),
            identity = self.mode.label(),
            resource,
            "Requesting managed identity token"
        );

        let token = cancellable("managed identity token acquisition", cancel, async {
            let response = request
                .send()
                .await
                .map_err(|e| self.classify_send_error(e))?;
            let status = response.status();
            let body = response.text().await.map_err(|e| {
                CatalogError::token_failed_with("Failed to read identity endpoint response", e)
            })?;

            if !status.is_success() {
                return Err(self.classify_status(status, &body));
            }

            let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
                CatalogError::token_failed_with("Malformed identity endpoint response", e)
            })?;
            parsed.into_access_token()
        })
        .await?;

        tracing::debug!(expires_on = %token.expires_on(), "Managed identity token acquired");
        Ok(token)
    }

    fn name(&self) -> &'static str {
        "managed-identity"
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn into_access_token(self) -> Result<AccessToken> {
        if self.access_token.is_empty() {
            return Err(CatalogError::token_failed(
                "Identity endpoint returned an empty access token",
            ));
        }

        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(parse_expires_on)
            .or_else(|| {
                self.expires_in
                    .as_ref()
                    .and_then(json_seconds)
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            })
            .ok_or_else(|| {
                CatalogError::token_failed("Identity endpoint response has no usable expiry")
            })?;

        Ok(AccessToken::new(self.access_token, expires_on))
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

fn json_seconds(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses `expires_on` as epoch seconds (number or string) or the App Service
/// `MM/DD/YYYY HH:MM:SS +00:00` form.
pub(crate) fn parse_expires_on(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = json_seconds(value) {
        return Utc.timestamp_opt(secs, 0).single();
    }

    let text = value.as_str()?;
    DateTime::parse_from_str(text.trim(), APP_SERVICE_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
