//! Connection parameters and the credential-free connection descriptor.

use std::fmt;
use std::time::Duration;
use tiberius::{Config, EncryptionLevel};

use crate::{CatalogError, Result};

/// Default SQL Server TCP port.
pub const DEFAULT_PORT: u16 = 1433;

/// Immutable database target, loaded once at startup.
///
/// # Security
/// This struct intentionally has no username or password fields;
/// authentication is always a bearer token attached at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    server: String,
    port: u16,
    database: String,
    encrypt: bool,
    trust_server_certificate: bool,
    connect_timeout: Duration,
}

impl ConnectionParameters {
    /// Creates parameters for `server` and `database` with secure defaults.
    ///
    /// `server` accepts `host`, `host,port` and `tcp:host,port` forms.
    ///
    /// # Errors
    /// Returns a configuration error for a blank host or database, or an
    /// unparsable port.
    pub fn new(server: &str, database: &str) -> Result<Self> {
        let (host, port) = parse_server(server)?;
        if database.trim().is_empty() {
            return Err(CatalogError::configuration("Sql:Database is required"));
        }

        Ok(Self {
            server: host,
            port,
            database: database.trim().to_string(),
            encrypt: true,
            trust_server_certificate: false,
            connect_timeout: Duration::from_secs(30),
        })
    }

    /// Builder method to set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to trust the server certificate without validation.
    #[must_use]
    pub const fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Server host name.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Server TCP port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Encryption is mandatory; always true.
    pub const fn encrypt(&self) -> bool {
        self.encrypt
    }

    /// Whether certificate validation is skipped.
    pub const fn trust_server_certificate(&self) -> bool {
        self.trust_server_certificate
    }

    /// Time allowed for TCP connect plus login.
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Credential-free description of the connection.
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            params: self.clone(),
        }
    }

    /// Tiberius configuration without authentication attached.
    pub(crate) fn tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.server);
        config.port(self.port);
        config.database(&self.database);
        config.encryption(EncryptionLevel::Required);
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config
    }
}

impl fmt::Display for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.server, self.port, self.database)
    }
}

/// Splits `tcp:host,port` into host and port.
fn parse_server(server: &str) -> Result<(String, u16)> {
    let trimmed = server.trim();
    let without_scheme = trimmed
        .get(..4)
        .filter(|p| p.eq_ignore_ascii_case("tcp:"))
        .map_or(trimmed, |_| &trimmed[4..]);

    let (host, port) = match without_scheme.split_once(',') {
        Some((host, port)) => {
            let port = port.trim().parse::<u16>().ok().filter(|p| *p > 0).ok_or_else(|| {
                CatalogError::configuration(format!("Invalid port in Sql:Server: '{port}'"))
            })?;
            (host.trim(), port)
        }
        None => (without_scheme.trim(), DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(CatalogError::configuration("Sql:Server is required"));
    }

    Ok((host.to_string(), port))
}

/// Connection string view of [`ConnectionParameters`].
///
/// The rendered string only ever contains the server, database, encryption
/// and timeout keys; there is no field from which a password could appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    params: ConnectionParameters,
}

impl ConnectionDescriptor {
    /// Renders an ADO-style connection string.
    ///
    /// ```rust
    /// use catalog_core::connection::ConnectionParameters;
    ///
    /// let params = ConnectionParameters::new("demo.database.windows.net", "catalog")?;
    /// assert_eq!(
    ///     params.descriptor().connection_string(),
    ///     "Server=tcp:demo.database.windows.net,1433;Database=catalog;Encrypt=True;TrustServerCertificate=False;Connect Timeout=30"
    /// );
    /// # Ok::<(), catalog_core::CatalogError>(())
    /// ```
    pub fn connection_string(&self) -> String {
        let p = &self.params;
        format!(
            "Server={};Database={};Encrypt={};TrustServerCertificate={};Connect Timeout={}",
            quote_value(&format!("tcp:{},{}", p.server, p.port)),
            quote_value(&p.database),
            if p.encrypt { "True" } else { "False" },
            if p.trust_server_certificate {
                "True"
            } else {
                "False"
            },
            p.connect_timeout.as_secs().max(1),
        )
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_string())
    }
}

/// Quotes an ADO value when it contains delimiters.
fn quote_value(value: &str) -> String {
    if value.contains([';', '=', '"', '\'']) || value.trim() != value {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
