//! Core of the managed-identity product catalog.
//!
//! This crate holds everything between configuration and result records:
//! token acquisition for a managed identity, token-authenticated Azure SQL
//! connections, the read-only catalog queries and the idempotent role
//! bootstrap used to grant an identity access in the first place.
//!
//! # Security Guarantees
//! - Database access is token-based only; no SQL logins or passwords exist
//!   anywhere in the configuration or connection types
//! - Catalog queries are read-only; filter values are always bound
//!   parameters and sort orders come from a closed set of literal clauses
//! - Access tokens are zeroized on drop and never logged
//!
//! # Flow
//! [`identity::TokenProvider`] → [`connection::ConnectionFactory`] →
//! [`repository::CatalogRepository`]. Each logical operation acquires its own
//! token, opens its own connection and closes it on every exit path.

pub mod bootstrap;
mod cancel;
pub mod connection;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod repository;
pub mod settings;

// Re-export commonly used types
pub use connection::{ConnectionDescriptor, ConnectionFactory, ConnectionParameters, OpenConnection};
pub use error::{CREDENTIAL_HINT, CatalogError, DATABASE_ACCESS_HINT, Result};
pub use identity::{AccessToken, IdentityMode, SQL_SCOPE, TokenProvider};
pub use logging::{LogFormat, init_logging};
pub use repository::{CatalogRepository, ProductFilter, ProductSort};
pub use settings::CatalogSettings;
