//! Process-wide configuration, loaded once at startup.
//!
//! Sources, lowest precedence first:
//! 1. an optional TOML file
//! 2. environment variables prefixed `CATALOG_`, with `__` separating
//!    sections (`CATALOG_SQL__SERVER`, `CATALOG_MANAGED_IDENTITY__USER_ASSIGNED_CLIENT_ID`)
//!
//! The resulting [`CatalogSettings`] is immutable and passed explicitly to the
//! connection factory; nothing here is global.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::connection::ConnectionParameters;
use crate::identity::IdentityMode;
use crate::{CatalogError, Result};

const ENV_PREFIX: &str = "CATALOG";

/// `Sql` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqlSettings {
    /// Target server host name (`Sql:Server`)
    pub server: String,
    /// Target database name (`Sql:Database`)
    pub database: String,
    /// Seconds allowed for TCP connect plus login
    pub connect_timeout_secs: u64,
    /// Skip server certificate validation (never in production)
    pub trust_server_certificate: bool,
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            database: String::new(),
            connect_timeout_secs: 30,
            trust_server_certificate: false,
        }
    }
}

/// `ManagedIdentity` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagedIdentitySettings {
    /// Presence switches the process to the user-assigned identity
    pub user_assigned_client_id: Option<String>,
}

/// `Web` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    /// Listen address
    pub bind: String,
    /// Row limit applied to listing pages
    pub take: u32,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            take: 50,
        }
    }
}

/// All catalog settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Database target
    pub sql: SqlSettings,
    /// Identity selection
    pub managed_identity: ManagedIdentitySettings,
    /// Web surface
    pub web: WebSettings,
}

impl CatalogSettings {
    /// Loads settings from `file` (if given) and the process environment.
    ///
    /// # Errors
    /// Returns a configuration error for unreadable sources or failed validation.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_from(file, None)
    }

    /// Loads settings with an explicit environment map instead of the process
    /// environment.
    ///
    /// # Errors
    /// Returns a configuration error for unreadable sources or failed validation.
    pub fn load_from(
        file: Option<&Path>,
        environment: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(environment),
        );

        let settings: Self = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| CatalogError::configuration(format!("Failed to load settings: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validates required values.
    ///
    /// # Errors
    /// Returns error if the server or database is missing, or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.sql.server.trim().is_empty() {
            return Err(CatalogError::configuration("Sql:Server is required"));
        }
        if self.sql.database.trim().is_empty() {
            return Err(CatalogError::configuration("Sql:Database is required"));
        }
        if self.sql.connect_timeout_secs == 0 {
            return Err(CatalogError::configuration(
                "Sql:ConnectTimeoutSecs must be greater than 0",
            ));
        }
        if self.web.bind.parse::<SocketAddr>().is_err() {
            return Err(CatalogError::configuration(format!(
                "Web:Bind is not a socket address: {}",
                self.web.bind
            )));
        }
        Ok(())
    }

    /// Identity mode derived from the optional client id.
    pub fn identity_mode(&self) -> IdentityMode {
        IdentityMode::resolve(self.managed_identity.user_assigned_client_id.as_deref())
    }

    /// Connection parameters for the connection factory.
    ///
    /// # Errors
    /// Returns a configuration error if the server value is malformed.
    pub fn connection_parameters(&self) -> Result<ConnectionParameters> {
        Ok(
            ConnectionParameters::new(&self.sql.server, self.sql.database.trim())?
                .with_connect_timeout(Duration::from_secs(self.sql.connect_timeout_secs))
                .with_trust_server_certificate(self.sql.trust_server_certificate),
        )
    }

    /// Parsed listen address.
    ///
    /// # Errors
    /// Returns a configuration error if the bind value is not an address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.web
            .bind
            .parse()
            .map_err(|e| CatalogError::configuration(format!("Invalid Web:Bind: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_load_from_environment() {
        let settings = CatalogSettings::load_from(
            None,
            env(&[
                ("CATALOG_SQL__SERVER", "demo.database.windows.net"),
                ("CATALOG_SQL__DATABASE", "catalog"),
            ]),
        )
        .expect("settings");

        assert_eq!(settings.sql.server, "demo.database.windows.net");
        assert_eq!(settings.sql.database, "catalog");
        assert_eq!(settings.sql.connect_timeout_secs, 30);
        assert_eq!(settings.identity_mode(), IdentityMode::SystemAssigned);
        assert_eq!(settings.web.take, 50);
    }

    #[test]
    fn test_user_assigned_client_id_switches_mode() {
        let settings = CatalogSettings::load_from(
            None,
            env(&[
                ("CATALOG_SQL__SERVER", "demo.database.windows.net"),
                ("CATALOG_SQL__DATABASE", "catalog"),
                (
                    "CATALOG_MANAGED_IDENTITY__USER_ASSIGNED_CLIENT_ID",
                    "11111111-2222-3333-4444-555555555555",
                ),
            ]),
        )
        .expect("settings");

        assert_eq!(
            settings.identity_mode().client_id(),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[test]
    fn test_missing_server_rejected() {
        let result =
            CatalogSettings::load_from(None, env(&[("CATALOG_SQL__DATABASE", "catalog")]));
        let error = result.expect_err("server is required");
        assert!(error.to_string().contains("Sql:Server is required"));
    }

    #[test]
    fn test_missing_database_rejected() {
        let result = CatalogSettings::load_from(
            None,
            env(&[("CATALOG_SQL__SERVER", "demo.database.windows.net")]),
        );
        let error = result.expect_err("database is required");
        assert!(error.to_string().contains("Sql:Database is required"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            "[sql]\nserver = \"file.database.windows.net\"\ndatabase = \"fromfile\"\nconnect_timeout_secs = 10\n\n[web]\ntake = 25"
        )
        .expect("write");

        let settings = CatalogSettings::load_from(
            Some(file.path()),
            env(&[("CATALOG_SQL__DATABASE", "fromenv")]),
        )
        .expect("settings");

        assert_eq!(settings.sql.server, "file.database.windows.net");
        assert_eq!(settings.sql.database, "fromenv");
        assert_eq!(settings.sql.connect_timeout_secs, 10);
        assert_eq!(settings.web.take, 25);
    }

    #[test]
    fn test_connection_parameters_from_settings() {
        let settings = CatalogSettings {
            sql: SqlSettings {
                server: "tcp:demo.database.windows.net,1433".to_string(),
                database: "catalog".to_string(),
                ..SqlSettings::default()
            },
            ..CatalogSettings::default()
        };
        let params = settings.connection_parameters().expect("params");
        assert_eq!(params.server(), "demo.database.windows.net");
        assert_eq!(params.port(), 1433);
        assert_eq!(params.connect_timeout(), Duration::from_secs(30));
    }
}
