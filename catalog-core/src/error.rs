//! Error types with credential sanitization.
//!
//! Every failure in the token → connection → query chain maps onto one
//! variant of [`CatalogError`]. Messages carry context only; access tokens and
//! connection secrets are never formatted into them.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for catalog operations.
///
/// # Security
/// Error messages never contain access tokens. Presentation layers should
/// show [`CatalogError::user_hint`] to end users and log the full error chain
/// internally.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No managed identity (or operator credential) is reachable
    #[error("Credential unavailable: {context}")]
    CredentialUnavailable {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The identity endpoint was reached but did not issue a token
    #[error("Token acquisition failed: {context}")]
    TokenAcquisitionFailed {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Network, TLS, login or timeout failure while opening a session
    #[error("Database connection failed: {context}")]
    ConnectionOpenFailed {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Statement execution or row mapping failed
    #[error("Query execution failed: {context}")]
    QueryExecutionFailed {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The caller cancelled the operation before it completed
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

/// Convenience type alias for Results with CatalogError
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Hint shown when the identity cannot obtain a token.
pub const CREDENTIAL_HINT: &str = "No managed identity is available to this process. Run it on an Azure resource with a system- or user-assigned identity enabled.";

/// Hint shown when the database refuses or cannot be reached.
pub const DATABASE_ACCESS_HINT: &str = "Unable to query Azure SQL. If this is the first run, make sure the database has a user for the app's Managed Identity and that Azure AD admin is configured on the SQL server.";

impl CatalogError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a credential-unavailable error without an underlying cause
    pub fn credential_unavailable(context: impl Into<String>) -> Self {
        Self::CredentialUnavailable {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a credential-unavailable error wrapping the probe failure
    pub fn credential_unavailable_with<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CredentialUnavailable {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a token acquisition error without an underlying cause
    pub fn token_failed(context: impl Into<String>) -> Self {
        Self::TokenAcquisitionFailed {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a token acquisition error wrapping the transport or parse failure
    pub fn token_failed_with<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TokenAcquisitionFailed {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a connection error with sanitized context
    pub fn connection_open_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionOpenFailed {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a query execution error
    pub fn query_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::QueryExecutionFailed {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a parsing error for a column that could not be read from a row.
    pub fn parse_field<E>(field_name: &str, operation: &str, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::QueryExecutionFailed {
            context: format!("Failed to read column '{field_name}' in {operation}"),
            source: Box::new(error),
        }
    }

    /// Creates a cancellation outcome for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Returns true when the operation was cancelled rather than failed.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Short, non-sensitive message suitable for end users.
    pub const fn user_hint(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => {
                "The catalog is not configured. Set Sql:Server and Sql:Database."
            }
            Self::CredentialUnavailable { .. } => CREDENTIAL_HINT,
            Self::TokenAcquisitionFailed { .. }
            | Self::ConnectionOpenFailed { .. }
            | Self::QueryExecutionFailed { .. } => DATABASE_ACCESS_HINT,
            Self::Cancelled { .. } => "The request was cancelled.",
        }
    }
}

/// A plain message error used as a `#[source]` where no richer cause exists.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Message(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = CatalogError::configuration("Sql:Server is required");
        assert!(error.to_string().contains("Sql:Server is required"));

        let error = CatalogError::credential_unavailable("IMDS endpoint unreachable");
        assert!(error.to_string().starts_with("Credential unavailable"));
    }

    #[test]
    fn test_cancelled_is_distinct_from_connection_failure() {
        let cancelled = CatalogError::cancelled("connection open");
        assert!(cancelled.is_cancelled());

        let failed = CatalogError::connection_open_failed(
            "connection open",
            Message("refused".to_string()),
        );
        assert!(!failed.is_cancelled());
    }

    #[test]
    fn test_user_hint_never_echoes_context() {
        let error = CatalogError::query_failed(
            "Server=tcp:secret-host,1433",
            Message("Login failed for token eyJ0eXAi".to_string()),
        );
        let hint = error.user_hint();
        assert!(!hint.contains("secret-host"));
        assert!(!hint.contains("eyJ0eXAi"));
        assert_eq!(hint, DATABASE_ACCESS_HINT);
    }

    #[test]
    fn test_source_chain_preserved() {
        use std::error::Error as _;
        let error = CatalogError::token_failed_with("IMDS", Message("503".to_string()));
        assert_eq!(
            error.source().map(ToString::to_string),
            Some("503".to_string())
        );
    }
}
