//! Driver boundary for sqlbridge
//!
//! Core abstractions a database driver implements:
//! - Connection: a live channel executing statements with commit/rollback
//! - ConnectionFactory: creates connections from [`ConnectionParameters`]
//!
//! A standalone connection is ended with [`Connection::terminate`]. Pooled
//! connections are never terminated by their users; they are handed back
//! through [`PooledConnection::release`](crate::pool::PooledConnection::release).

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;

use crate::error::Result;
use crate::params::ConnectionParameters;

/// A live connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a fully rendered statement, returns affected row count
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Check whether the connection is still alive
    async fn is_connected(&self) -> bool;

    /// Terminate the connection
    async fn terminate(&self) -> Result<()>;
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn Connection>>;

    /// Name of the driver behind this factory (used in logs)
    fn driver_name(&self) -> &str {
        "custom"
    }
}

/// Boxed connect closure accepted by [`connect_fn`]
pub type ConnectFuture = BoxFuture<'static, Result<Box<dyn Connection>>>;

/// [`ConnectionFactory`] backed by a closure
pub struct FnConnectionFactory<F> {
    name: String,
    connect: F,
}

impl<F> fmt::Debug for FnConnectionFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConnectionFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> FnConnectionFactory<F> {
    /// Rename the driver reported in logs
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Wrap a connect function into a [`ConnectionFactory`].
///
/// ```rust,ignore
/// let factory = connect_fn(|params| {
///     let params = params.clone();
///     Box::pin(async move { MyDriver::open(&params).await })
/// });
/// ```
pub fn connect_fn<F>(connect: F) -> FnConnectionFactory<F>
where
    F: Fn(&ConnectionParameters) -> ConnectFuture + Send + Sync,
{
    FnConnectionFactory {
        name: "fn".to_string(),
        connect,
    }
}

#[async_trait]
impl<F> ConnectionFactory for FnConnectionFactory<F>
where
    F: Fn(&ConnectionParameters) -> ConnectFuture + Send + Sync,
{
    async fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn Connection>> {
        (self.connect)(params).await
    }

    fn driver_name(&self) -> &str {
        &self.name
    }
}
