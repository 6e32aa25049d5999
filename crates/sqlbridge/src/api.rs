//! Database access API
//!
//! The API is a delegate that is handed ("wired") a live connection and,
//! optionally, a pool. It never opens or terminates either resource.
//!
//! Capabilities are split into traits:
//! - [`Connectable`]: wiring and liveness
//! - [`Executable`]: statements on the single wired connection
//! - [`Poolable`]: statements on a connection checked out from the wired pool
//!
//! Statement failures do not surface as `Err`. They roll the transaction back
//! and come back as [`ExecutionOutcome::RolledBack`], so `Err` always means the
//! statement never reached the database (unwired API, bad template, no pool
//! connection).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::pool::NamedPool;
use crate::template::{StatementTemplate, TemplateValues};

/// Result of running one statement
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Statement executed and committed
    Committed {
        /// The rendered statement
        statement: String,
        /// Rows affected as reported by the driver
        rows_affected: u64,
    },
    /// Statement (or its commit) failed and the transaction was rolled back
    RolledBack {
        /// The rendered statement
        statement: String,
        /// Why the statement failed
        error: Error,
        /// Set when the rollback itself failed too
        rollback_error: Option<Error>,
    },
}

impl ExecutionOutcome {
    /// Whether the statement was committed
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// The rendered statement sent to the driver
    pub fn statement(&self) -> &str {
        match self {
            Self::Committed { statement, .. } | Self::RolledBack { statement, .. } => statement,
        }
    }

    /// Rows affected, if committed
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Committed { rows_affected, .. } => Some(*rows_affected),
            Self::RolledBack { .. } => None,
        }
    }

    /// The statement error, if rolled back
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Committed { .. } => None,
            Self::RolledBack { error, .. } => Some(error),
        }
    }

    /// Convert into a plain result: rows affected or the statement error
    pub fn into_result(self) -> Result<u64> {
        match self {
            Self::Committed { rows_affected, .. } => Ok(rows_affected),
            Self::RolledBack { error, .. } => Err(error),
        }
    }
}

/// Wiring and liveness
#[async_trait]
pub trait Connectable: Send + Sync {
    /// Hand the API its connection and optional pool; the last call wins
    fn wire(&self, connection: Arc<dyn Connection>, pool: Option<Arc<NamedPool>>);

    /// Whether `wire` has been called
    fn is_wired(&self) -> bool;

    /// Ask the wired single connection whether it is alive
    async fn check_liveness(&self) -> Result<bool>;
}

/// Statement execution on the single wired connection
#[async_trait]
pub trait Executable: Connectable {
    /// Render `template` with `values` and run it on the single connection,
    /// committing on success and rolling back on failure
    async fn execute_using_connection(
        &self,
        template: &str,
        values: &TemplateValues,
    ) -> Result<ExecutionOutcome>;
}

/// Statement execution on pooled connections
#[async_trait]
pub trait Poolable: Connectable {
    /// Render `template` with `values` and run it on a connection checked out
    /// from the wired pool. The connection is checked back in on every path.
    async fn execute_using_pool(
        &self,
        template: &str,
        values: &TemplateValues,
    ) -> Result<ExecutionOutcome>;
}

/// Full database API: single connection plus pool
pub trait DatabaseApi: Executable + Poolable {}

impl<T: Executable + Poolable> DatabaseApi for T {}

#[derive(Clone)]
struct Wiring {
    connection: Arc<dyn Connection>,
    pool: Option<Arc<NamedPool>>,
}

/// Driver-agnostic SQL API
///
/// Statements on the single connection are serialized so one call's
/// execute/commit pair never interleaves with another's.
#[derive(Default)]
pub struct SqlApi {
    wiring: parking_lot::RwLock<Option<Wiring>>,
    connection_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SqlApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let wiring = self.wiring.read();
        f.debug_struct("SqlApi")
            .field("wired", &wiring.is_some())
            .field(
                "pool",
                &wiring
                    .as_ref()
                    .and_then(|w| w.pool.as_ref())
                    .map(|p| p.name().to_string()),
            )
            .finish()
    }
}

impl SqlApi {
    /// Create an unwired API
    pub fn new() -> Self {
        Self::default()
    }

    fn wiring(&self) -> Result<Wiring> {
        self.wiring
            .read()
            .clone()
            .ok_or_else(|| Error::not_wired("call wire() or connect_api_to_database() first"))
    }

    fn wired_pool(&self) -> Result<Arc<NamedPool>> {
        self.wiring()?
            .pool
            .ok_or_else(|| Error::not_wired("no connection pool was wired"))
    }
}

/// Execute, then commit or roll back
async fn run_statement(conn: &dyn Connection, statement: String) -> ExecutionOutcome {
    debug!(statement = %statement, "Executing statement");

    let failure = match conn.execute(&statement).await {
        Ok(rows_affected) => match conn.commit().await {
            Ok(()) => {
                return ExecutionOutcome::Committed {
                    statement,
                    rows_affected,
                }
            }
            Err(e) => e,
        },
        Err(e) => e,
    };

    error!(error = %failure, "Statement failed, rolling back");
    let rollback_error = match conn.rollback().await {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "Rollback failed");
            Some(e)
        }
    };

    ExecutionOutcome::RolledBack {
        statement,
        error: failure,
        rollback_error,
    }
}

#[async_trait]
impl Connectable for SqlApi {
    fn wire(&self, connection: Arc<dyn Connection>, pool: Option<Arc<NamedPool>>) {
        debug!(
            pool = pool.as_ref().map(|p| p.name()).unwrap_or("-"),
            "Wiring database API"
        );
        *self.wiring.write() = Some(Wiring { connection, pool });
    }

    fn is_wired(&self) -> bool {
        self.wiring.read().is_some()
    }

    async fn check_liveness(&self) -> Result<bool> {
        let wiring = self.wiring()?;
        Ok(wiring.connection.is_connected().await)
    }
}

#[async_trait]
impl Executable for SqlApi {
    async fn execute_using_connection(
        &self,
        template: &str,
        values: &TemplateValues,
    ) -> Result<ExecutionOutcome> {
        let wiring = self.wiring()?;
        let statement = StatementTemplate::parse(template)?.render(values)?;

        let _serial = self.connection_lock.lock().await;
        Ok(run_statement(wiring.connection.as_ref(), statement).await)
    }
}

#[async_trait]
impl Poolable for SqlApi {
    async fn execute_using_pool(
        &self,
        template: &str,
        values: &TemplateValues,
    ) -> Result<ExecutionOutcome> {
        let pool = self.wired_pool()?;
        let statement = StatementTemplate::parse(template)?.render(values)?;

        let conn = pool.checkout().await?;
        let outcome = run_statement(&*conn, statement).await;
        conn.release().await;
        Ok(outcome)
    }
}
