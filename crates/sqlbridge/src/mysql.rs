//! MySQL backend for sqlbridge
//!
//! Provides:
//! - [`MySqlConnector`]: connection factory built from [`ConnectionParameters`]
//! - [`MySqlConnection`]: a `mysql_async` session with autocommit disabled,
//!   so every statement runs in a transaction closed by commit/rollback

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder};
use tokio::sync::Mutex;
use tracing::debug;

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::params::ConnectionParameters;

/// Default MySQL port
pub const DEFAULT_PORT: u16 = 3306;

/// Statements run when a session starts
const SESSION_INIT: &[&str] = &["SET autocommit=0"];

/// Build `mysql_async` options from connection parameters.
///
/// Recognised keys: `host` (default `localhost`), `port` (default 3306),
/// `user`/`username`, `password`/`passwd`, `database`/`db`.
pub fn opts_from_params(params: &ConnectionParameters) -> Result<Opts> {
    let builder = OptsBuilder::default()
        .ip_or_hostname(params.host().unwrap_or("localhost"))
        .tcp_port(params.port()?.unwrap_or(DEFAULT_PORT))
        .user(params.user())
        .pass(params.password())
        .db_name(params.database())
        .init(SESSION_INIT.to_vec());
    Ok(Opts::from(builder))
}

/// MySQL connection implementation
pub struct MySqlConnection {
    conn: Mutex<Option<Conn>>,
    database: Option<String>,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection {
    /// Wrap an existing session
    pub fn new(conn: Conn, database: Option<String>) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            database,
        }
    }

    /// Open a session from connection parameters
    pub async fn connect(params: &ConnectionParameters) -> Result<Self> {
        let opts = opts_from_params(params)?;
        let database = opts.db_name().map(str::to_string);

        let conn = Conn::new(opts)
            .await
            .map_err(|e| Error::connection_with_source("Failed to connect to MySQL", e))?;

        Ok(Self::new(conn, database))
    }

    /// Database this session was opened against
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn run(&self, sql: &str) -> Result<u64> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::not_connected("MySQL connection was terminated"))?;

        conn.query_drop(sql)
            .await
            .map_err(|e| Error::Statement {
                message: format!("MySQL rejected statement: {}", e),
                sql: Some(sql.to_string()),
                source: Some(Box::new(e)),
            })?;

        Ok(conn.affected_rows())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.run(sql).await
    }

    async fn commit(&self) -> Result<()> {
        self.run("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> Result<()> {
        self.run("ROLLBACK").await.map(|_| ())
    }

    async fn is_connected(&self) -> bool {
        match self.conn.lock().await.as_mut() {
            Some(conn) => conn.ping().await.is_ok(),
            None => false,
        }
    }

    async fn terminate(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.disconnect()
                .await
                .map_err(|e| Error::connection_with_source("Failed to close MySQL connection", e))?;
            debug!(database = ?self.database, "MySQL connection closed");
        }
        Ok(())
    }
}

/// MySQL connection factory
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    /// Create a new MySQL connection factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for MySqlConnector {
    async fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn Connection>> {
        let conn = MySqlConnection::connect(params).await?;
        Ok(Box::new(conn))
    }

    fn driver_name(&self) -> &str {
        "mysql"
    }
}
