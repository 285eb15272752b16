//! Idempotent read-role bootstrap.
//!
//! A run inspects the database, plans the missing statements with the pure
//! [`plan`] function and applies them. The whole sequence runs under a
//! session-scoped application lock, so two operators bootstrapping the same
//! database serialize instead of racing between check and act.

mod identifier;
mod plan;

pub use identifier::{MAX_IDENTIFIER_LEN, quote_identifier};
pub use plan::{
    BootstrapRequest, BootstrapStep, DEFAULT_ROLE, DEFAULT_SCHEMA, DatabaseState, Principal,
    PrincipalKind, PrincipalState, plan,
};

use tiberius::Query;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::connection::{ConnectionFactory, SqlClient};
use crate::error::Message;
use crate::{CatalogError, Result};

const APP_LOCK_RESOURCE: &str = "catalog-bootstrap";
const APP_LOCK_TIMEOUT_MS: i32 = 30_000;

const ACQUIRE_LOCK: &str = r"
declare @result int;
exec @result = sp_getapplock
    @Resource = @P1,
    @LockMode = 'Exclusive',
    @LockOwner = 'Session',
    @LockTimeout = @P2;
select @result as LockResult;";

const RELEASE_LOCK: &str = r"
exec sp_releaseapplock @Resource = @P1, @LockOwner = 'Session';";

const INSPECT_ROLE: &str = r"
select
    cast(case when exists (select 1 from sys.schemas where name = @P2)
        then 1 else 0 end as bit) as SchemaExists,
    cast(case when exists (
            select 1 from sys.database_principals
            where name = @P1 and type = 'R')
        then 1 else 0 end as bit) as RoleExists,
    cast(case when exists (
            select 1
            from sys.database_permissions dp
            join sys.database_principals r on r.principal_id = dp.grantee_principal_id
            join sys.schemas s on s.schema_id = dp.major_id
            where dp.class = 3
              and dp.permission_name = 'SELECT'
              and dp.state in ('G', 'W')
              and r.name = @P1
              and s.name = @P2)
        then 1 else 0 end as bit) as SelectGranted;";

const INSPECT_PRINCIPAL: &str = r"
select
    cast(case when exists (
            select 1 from sys.database_principals where name = @P1)
        then 1 else 0 end as bit) as UserExists,
    cast(case when exists (
            select 1
            from sys.database_role_members m
            join sys.database_principals r on r.principal_id = m.role_principal_id
            join sys.database_principals u on u.principal_id = m.member_principal_id
            where r.name = @P2 and u.name = @P1)
        then 1 else 0 end as bit) as IsMember;";

/// Outcome of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BootstrapReport {
    /// Statements executed, in order
    pub applied: Vec<BootstrapStep>,
}

impl BootstrapReport {
    /// True when the database already matched the request.
    pub const fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies a [`BootstrapRequest`] through one connection.
#[derive(Debug, Clone)]
pub struct RoleBootstrapper {
    connections: ConnectionFactory,
}

impl RoleBootstrapper {
    /// Creates a bootstrapper over `connections`.
    pub const fn new(connections: ConnectionFactory) -> Self {
        Self { connections }
    }

    /// Runs the request: lock, inspect, plan, apply, unlock.
    ///
    /// # Errors
    /// - `Configuration` for unquotable names or a missing schema
    /// - token and connection errors from the factory
    /// - `QueryExecutionFailed` when a statement fails or the lock times out
    /// - `Cancelled` when `cancel` fires
    pub async fn run(
        &self,
        request: &BootstrapRequest,
        cancel: &CancellationToken,
    ) -> Result<BootstrapReport> {
        request.validate()?;

        let mut connection = self.connections.open(cancel).await?;
        tracing::info!(
            server = %self.connections.parameters(),
            role = request.role(),
            schema = request.schema(),
            principals = request.principals().len(),
            "Connected, starting bootstrap"
        );

        let result = cancellable("bootstrap", cancel, apply(request, connection.client())).await;
        connection.close().await;
        result
    }
}

async fn apply(request: &BootstrapRequest, client: &mut SqlClient) -> Result<BootstrapReport> {
    acquire_lock(client).await?;
    let outcome = inspect_and_apply(request, client).await;
    release_lock(client).await;
    outcome
}

async fn inspect_and_apply(
    request: &BootstrapRequest,
    client: &mut SqlClient,
) -> Result<BootstrapReport> {
    let state = inspect(request, client).await?;
    tracing::debug!(?state, "Inspected database state");

    let steps = plan(request, &state)?;
    if steps.is_empty() {
        tracing::info!("Database already provisioned, nothing to do");
        return Ok(BootstrapReport::default());
    }

    let mut report = BootstrapReport::default();
    for step in steps {
        let sql = step.sql()?;
        tracing::info!(%step, "Applying");
        client
            .execute(sql, &[])
            .await
            .map_err(|e| CatalogError::query_failed(format!("Failed to {step}"), e))?;
        report.applied.push(step);
    }
    Ok(report)
}

async fn acquire_lock(client: &mut SqlClient) -> Result<()> {
    let mut query = Query::new(ACQUIRE_LOCK);
    query.bind(APP_LOCK_RESOURCE);
    query.bind(APP_LOCK_TIMEOUT_MS);

    let row = query
        .query(client)
        .await
        .map_err(|e| CatalogError::query_failed("Failed to request bootstrap lock", e))?
        .into_row()
        .await
        .map_err(|e| CatalogError::query_failed("Failed to request bootstrap lock", e))?;

    let code = row
        .and_then(|r| r.try_get::<i32, _>("LockResult").ok().flatten())
        .unwrap_or(-999);
    if code < 0 {
        return Err(CatalogError::query_failed(
            "Failed to acquire bootstrap lock",
            Message(format!(
                "sp_getapplock returned {code}; another bootstrap may be running"
            )),
        ));
    }
    tracing::debug!(code, "Bootstrap lock acquired");
    Ok(())
}

async fn release_lock(client: &mut SqlClient) {
    let mut query = Query::new(RELEASE_LOCK);
    query.bind(APP_LOCK_RESOURCE);
    if let Err(e) = query.execute(client).await {
        tracing::debug!(error = %e, "Failed to release bootstrap lock; it ends with the session");
    }
}

async fn inspect(request: &BootstrapRequest, client: &mut SqlClient) -> Result<DatabaseState> {
    let mut query = Query::new(INSPECT_ROLE);
    query.bind(request.role());
    query.bind(request.schema());
    let row = single_row(query, client, "role state").await?;

    let mut state = DatabaseState {
        schema_exists: flag(&row, "SchemaExists")?,
        role_exists: flag(&row, "RoleExists")?,
        schema_select_granted: flag(&row, "SelectGranted")?,
        principals: Vec::with_capacity(request.principals().len()),
    };

    for principal in request.principals() {
        let mut query = Query::new(INSPECT_PRINCIPAL);
        query.bind(principal.name.as_str());
        query.bind(request.role());
        let row = single_row(query, client, "principal state").await?;
        state.principals.push((
            principal.name.clone(),
            PrincipalState {
                user_exists: flag(&row, "UserExists")?,
                is_member: flag(&row, "IsMember")?,
            },
        ));
    }

    Ok(state)
}

async fn single_row(
    query: Query<'_>,
    client: &mut SqlClient,
    what: &str,
) -> Result<tiberius::Row> {
    query
        .query(client)
        .await
        .map_err(|e| CatalogError::query_failed(format!("Failed to inspect {what}"), e))?
        .into_row()
        .await
        .map_err(|e| CatalogError::query_failed(format!("Failed to inspect {what}"), e))?
        .ok_or_else(|| {
            CatalogError::query_failed(
                format!("Failed to inspect {what}"),
                Message("no row returned".to_string()),
            )
        })
}

fn flag(row: &tiberius::Row, column: &str) -> Result<bool> {
    row.try_get::<bool, _>(column)
        .map_err(|e| CatalogError::parse_field(column, "bootstrap inspection", e))
        .map(Option::unwrap_or_default)
}
