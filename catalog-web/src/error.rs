//! Mapping of catalog failures onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog_core::CatalogError;
use serde_json::json;
use std::error::Error as _;

/// Error returned by every handler.
///
/// Full details go to the log; the client only ever sees the short hint.
#[derive(Debug)]
pub enum ApiError {
    /// Failure from the catalog core
    Catalog(CatalogError),
    /// A query string value that could not be parsed
    BadRequest(String),
}

impl From<CatalogError> for ApiError {
    fn from(error: CatalogError) -> Self {
        Self::Catalog(error)
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Catalog(e) => match e {
                CatalogError::CredentialUnavailable { .. }
                | CatalogError::TokenAcquisitionFailed { .. }
                | CatalogError::ConnectionOpenFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
                CatalogError::Cancelled { .. } => {
                    // Client closed the request; nobody reads this.
                    StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
                }
                CatalogError::Configuration { .. } | CatalogError::QueryExecutionFailed { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

/// Renders `error` and its sources as one line for the log.
pub fn error_chain(error: &CatalogError) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) => {
                tracing::debug!(%message, "Rejected request");
                message.clone()
            }
            Self::Catalog(e) if e.is_cancelled() => {
                tracing::debug!(error = %e, "Request cancelled by client");
                e.user_hint().to_string()
            }
            Self::Catalog(e) => {
                tracing::error!(error = %error_chain(e), status = status.as_u16(), "Catalog request failed");
                e.user_hint().to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::error::Message;

    #[test]
    fn test_status_mapping() {
        let unavailable = ApiError::from(CatalogError::credential_unavailable("imds"));
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let open = ApiError::from(CatalogError::connection_open_failed(
            "open",
            Message("login failed".into()),
        ));
        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);

        let query = ApiError::from(CatalogError::query_failed(
            "products",
            Message("invalid column".into()),
        ));
        assert_eq!(query.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let cancelled = ApiError::from(CatalogError::cancelled("products"));
        assert_eq!(cancelled.status().as_u16(), 499);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let error = CatalogError::connection_open_failed(
            "Could not open connection to demo:1433/catalog",
            Message("timed out after 30s".into()),
        );
        let chain = error_chain(&error);
        assert!(chain.contains("demo:1433/catalog"));
        assert!(chain.ends_with("timed out after 30s"));
    }
}
