//! Token-authenticated Azure SQL connections.
//!
//! [`ConnectionFactory::open`] performs the whole acquisition flow for one
//! logical operation: fresh token → TDS config with the token attached →
//! TCP connect and login within the configured timeout. Connections are never
//! pooled or shared; the caller owns the [`OpenConnection`] and closes it.

mod parameters;

pub use parameters::{ConnectionDescriptor, ConnectionParameters, DEFAULT_PORT};

use std::sync::Arc;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tokio_util::sync::CancellationToken;

use crate::error::Message;
use crate::identity::{AccessToken, IdentityMode, SQL_SCOPE, TokenProvider, credential_for};
use crate::{CatalogError, Result};

/// Tiberius client over a tokio TCP stream.
pub type SqlClient = Client<Compat<TcpStream>>;

/// Opens one authenticated connection per call.
///
/// # Example
/// ```rust,no_run
/// use catalog_core::connection::{ConnectionFactory, ConnectionParameters};
/// use catalog_core::identity::IdentityMode;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> catalog_core::Result<()> {
/// let params = ConnectionParameters::new("demo.database.windows.net", "catalog")?;
/// let factory = ConnectionFactory::for_identity(params, &IdentityMode::SystemAssigned)?;
/// let connection = factory.open(&CancellationToken::new()).await?;
/// connection.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionFactory {
    params: ConnectionParameters,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("params", &self.params)
            .field("tokens", &self.tokens.name())
            .finish()
    }
}

impl ConnectionFactory {
    /// Creates a factory with an explicit token provider.
    pub fn new(params: ConnectionParameters, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { params, tokens }
    }

    /// Creates a factory authenticating as the managed identity `mode`.
    ///
    /// # Errors
    /// Returns a configuration error if the identity endpoint is malformed.
    pub fn for_identity(params: ConnectionParameters, mode: &IdentityMode) -> Result<Self> {
        Ok(Self::new(params, credential_for(mode)?))
    }

    /// Immutable connection parameters.
    pub const fn parameters(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Descriptor of the connection this factory opens (no credentials).
    pub fn descriptor(&self) -> ConnectionDescriptor {
        self.params.descriptor()
    }

    /// Acquires a fresh token and opens an authenticated connection.
    ///
    /// # Errors
    /// - `CredentialUnavailable` / `TokenAcquisitionFailed` from the token provider
    /// - `ConnectionOpenFailed` on network, TLS, login or timeout failures
    /// - `Cancelled` if `cancel` fires before the connection is ready
    pub async fn open(&self, cancel: &CancellationToken) -> Result<OpenConnection> {
        let token = self.tokens.acquire_token(SQL_SCOPE, cancel).await?;
        self.open_with_token(&token, cancel).await
    }

    /// Opens a connection with an already acquired token.
    ///
    /// # Errors
    /// Same as [`ConnectionFactory::open`] minus the token errors.
    pub async fn open_with_token(
        &self,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<OpenConnection> {
        let mut config = self.params.tiberius_config();
        config.authentication(AuthMethod::aad_token(token.secret()));

        let timeout = self.params.connect_timeout();
        let target = self.params.to_string();
        tracing::debug!(server = %target, ?timeout, "Opening database connection");

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CatalogError::cancelled("connection open")),
            outcome = tokio::time::timeout(timeout, connect(config)) => outcome,
        };

        match outcome {
            Ok(Ok(client)) => {
                tracing::debug!(server = %target, "Database connection established");
                Ok(OpenConnection {
                    client,
                    token_expires_on: token.expires_on(),
                })
            }
            Ok(Err(e)) => Err(CatalogError::connection_open_failed(
                format!("Could not open connection to {target}"),
                e,
            )),
            Err(_) => Err(CatalogError::connection_open_failed(
                format!("Could not open connection to {target}"),
                Message(format!(
                    "timed out after {}",
                    humanize(timeout)
                )),
            )),
        }
    }
}

fn humanize(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

async fn connect_once(config: Config) -> tiberius::Result<SqlClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

/// Connects, following one gateway redirect as Azure SQL may issue.
async fn connect(config: Config) -> tiberius::Result<SqlClient> {
    match connect_once(config.clone()).await {
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!(%host, port, "Following server redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);
            connect_once(config).await
        }
        other => other,
    }
}

/// A live session owned by exactly one logical operation.
pub struct OpenConnection {
    client: SqlClient,
    token_expires_on: chrono::DateTime<chrono::Utc>,
}

impl OpenConnection {
    /// Mutable access to the underlying client for statement execution.
    pub const fn client(&mut self) -> &mut SqlClient {
        &mut self.client
    }

    /// Expiry of the token this session logged in with.
    pub const fn token_expires_on(&self) -> chrono::DateTime<chrono::Utc> {
        self.token_expires_on
    }

    /// Closes the session. Failures are logged, not returned: the operation
    /// using the connection has already completed.
    pub async fn close(self) {
        if let Err(e) = self.client.close().await {
            tracing::debug!(error = %e, "Error while closing database connection");
        }
    }
}

impl std::fmt::Debug for OpenConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenConnection")
            .field("token_expires_on", &self.token_expires_on)
            .finish_non_exhaustive()
    }
}
