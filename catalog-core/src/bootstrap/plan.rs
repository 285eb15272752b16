//! Bootstrap request, observed database state and the pure step planner.

use serde::Serialize;
use std::fmt;

use super::identifier::quote_identifier;
use crate::{CatalogError, Result};

/// Default role granted read access.
pub const DEFAULT_ROLE: &str = "catalog_reader";
/// Default schema the role may read.
pub const DEFAULT_SCHEMA: &str = "SalesLT";

/// How a principal's identity was assigned; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrincipalKind {
    /// The identity bound to a compute resource
    SystemAssigned,
    /// A standalone identity resource
    UserAssigned,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SystemAssigned => "system-assigned",
            Self::UserAssigned => "user-assigned",
        })
    }
}

/// A managed identity to map into the database, by display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Display name of the identity in Entra ID
    pub name: String,
    /// Assignment kind
    pub kind: PrincipalKind,
}

/// What one bootstrap run should ensure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    role: String,
    schema: String,
    principals: Vec<Principal>,
}

impl Default for BootstrapRequest {
    fn default() -> Self {
        Self::new(DEFAULT_ROLE, DEFAULT_SCHEMA)
    }
}

impl BootstrapRequest {
    /// Request for `role` reading `schema`, with no principals yet.
    pub fn new(role: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            schema: schema.into(),
            principals: Vec::new(),
        }
    }

    /// Adds a principal. Names already present (compared case-insensitively,
    /// as database principal names are) are ignored.
    #[must_use]
    pub fn with_principal(mut self, name: impl Into<String>, kind: PrincipalKind) -> Self {
        let name = name.into();
        if !self
            .principals
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&name))
        {
            self.principals.push(Principal { name, kind });
        }
        self
    }

    /// Role name.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Schema name.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Principals in the order they were given.
    pub fn principals(&self) -> &[Principal] {
        &self.principals
    }

    /// Checks every name can be quoted.
    ///
    /// # Errors
    /// Returns the first identifier error.
    pub fn validate(&self) -> Result<()> {
        quote_identifier(&self.role)?;
        quote_identifier(&self.schema)?;
        for principal in &self.principals {
            quote_identifier(&principal.name)?;
        }
        Ok(())
    }
}

/// Observed state of one principal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalState {
    /// A database user with this name exists
    pub user_exists: bool,
    /// The user is a member of the role
    pub is_member: bool,
}

/// Observed database state relevant to a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseState {
    /// The target schema exists
    pub schema_exists: bool,
    /// The role exists
    pub role_exists: bool,
    /// The role holds SELECT on the schema
    pub schema_select_granted: bool,
    /// Per principal, in request order
    pub principals: Vec<(String, PrincipalState)>,
}

impl DatabaseState {
    /// State recorded for `name`, or the empty state if it was not inspected.
    pub fn principal(&self, name: &str) -> PrincipalState {
        self.principals
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| s.clone())
            .unwrap_or_default()
    }
}

/// One mutating statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BootstrapStep {
    /// `create role`
    CreateRole {
        /// Role name
        role: String,
    },
    /// `grant select on schema::`
    GrantSchemaSelect {
        /// Schema name
        schema: String,
        /// Role name
        role: String,
    },
    /// `create user .. from external provider`
    CreateExternalUser {
        /// Principal display name
        principal: String,
    },
    /// `alter role .. add member`
    AddRoleMember {
        /// Role name
        role: String,
        /// Principal display name
        principal: String,
    },
}

impl BootstrapStep {
    /// T-SQL for this step, with every identifier quoted.
    ///
    /// # Errors
    /// Returns a configuration error for an identifier that cannot be quoted.
    pub fn sql(&self) -> Result<String> {
        Ok(match self {
            Self::CreateRole { role } => format!("create role {};", quote_identifier(role)?),
            Self::GrantSchemaSelect { schema, role } => format!(
                "grant select on schema::{} to {};",
                quote_identifier(schema)?,
                quote_identifier(role)?
            ),
            Self::CreateExternalUser { principal } => format!(
                "create user {} from external provider;",
                quote_identifier(principal)?
            ),
            Self::AddRoleMember { role, principal } => format!(
                "alter role {} add member {};",
                quote_identifier(role)?,
                quote_identifier(principal)?
            ),
        })
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateRole { role } => write!(f, "create role '{role}'"),
            Self::GrantSchemaSelect { schema, role } => {
                write!(f, "grant SELECT on schema '{schema}' to '{role}'")
            }
            Self::CreateExternalUser { principal } => {
                write!(f, "create external user '{principal}'")
            }
            Self::AddRoleMember { role, principal } => {
                write!(f, "add '{principal}' to role '{role}'")
            }
        }
    }
}

/// Computes the statements needed to move `state` to what `request` asks for.
///
/// Steps come out in dependency order: role, grant, then per principal the
/// user followed by its membership. A fully provisioned database yields no
/// steps.
///
/// # Errors
/// Returns a configuration error when the schema does not exist; nothing
/// should be changed in that case.
pub fn plan(request: &BootstrapRequest, state: &DatabaseState) -> Result<Vec<BootstrapStep>> {
    if !state.schema_exists {
        return Err(CatalogError::configuration(format!(
            "Schema '{}' does not exist in the target database",
            request.schema
        )));
    }

    let mut steps = Vec::new();
    if !state.role_exists {
        steps.push(BootstrapStep::CreateRole {
            role: request.role.clone(),
        });
    }
    if !state.role_exists || !state.schema_select_granted {
        steps.push(BootstrapStep::GrantSchemaSelect {
            schema: request.schema.clone(),
            role: request.role.clone(),
        });
    }

    for principal in &request.principals {
        let observed = state.principal(&principal.name);
        if !observed.user_exists {
            steps.push(BootstrapStep::CreateExternalUser {
                principal: principal.name.clone(),
            });
        }
        if !state.role_exists || !observed.user_exists || !observed.is_member {
            steps.push(BootstrapStep::AddRoleMember {
                role: request.role.clone(),
                principal: principal.name.clone(),
            });
        }
    }

    Ok(steps)
}
