//! Named connection pool for sqlbridge
//!
//! A fixed-size pool created eagerly:
//! - All `size` connections are opened at construction; any failure fails construction
//! - Capacity never changes afterwards
//! - Semaphore-bounded checkouts, fail-fast or bounded wait on exhaustion
//! - Optional liveness check on checkout with transparent replacement
//! - Names are unique per process while the pool is alive
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlbridge::prelude::*;
//!
//! let pool = NamedPool::new(PoolConfig::new("orders").with_size(4), factory, params).await?;
//!
//! let conn = pool.checkout().await?;
//! conn.execute("UPDATE orders SET state = 'paid' WHERE id = 7").await?;
//! conn.release().await;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::params::ConnectionParameters;
use crate::security::validate_pool_name;

/// Default pool name
pub const DEFAULT_POOL_NAME: &str = "sqlbridge_pool";

/// Default pool size
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Largest accepted pool size
pub const MAX_POOL_SIZE: usize = 32;

/// Names of pools alive in this process
static POOL_NAMES: LazyLock<parking_lot::Mutex<HashSet<String>>> =
    LazyLock::new(|| parking_lot::Mutex::new(HashSet::new()));

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, unique per process
    #[serde(default = "default_pool_name")]
    pub name: String,
    /// Number of connections, fixed for the pool's lifetime
    #[serde(default = "default_pool_size")]
    pub size: usize,
    /// How long a checkout may wait for a free connection.
    /// `None` fails immediately when every connection is checked out.
    #[serde(default, with = "option_millis", rename = "acquire_timeout_ms")]
    pub acquire_timeout: Option<Duration>,
    /// Check liveness of idle connections on checkout
    #[serde(default = "default_true")]
    pub test_on_checkout: bool,
}

fn default_pool_name() -> String {
    DEFAULT_POOL_NAME.to_string()
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_true() -> bool {
    true
}

mod option_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            size: default_pool_size(),
            acquire_timeout: None,
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a pool config with the given name and default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set pool size
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Wait up to `timeout` for a free connection instead of failing fast
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Enable/disable liveness check on checkout
    pub fn with_test_on_checkout(mut self, test: bool) -> Self {
        self.test_on_checkout = test;
        self
    }

    /// Validate name and size
    pub fn validate(&self) -> Result<()> {
        validate_pool_name(&self.name)?;
        if self.size == 0 || self.size > MAX_POOL_SIZE {
            return Err(Error::config(format!(
                "Pool size must be between 1 and {}, got {}",
                MAX_POOL_SIZE, self.size
            )));
        }
        Ok(())
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections opened
    pub connections_created: u64,
    /// Total number of connections terminated
    pub connections_terminated: u64,
    /// Successful checkouts
    pub checkouts: u64,
    /// Connections returned to the pool
    pub checkins: u64,
    /// Checkouts refused because the pool was exhausted
    pub exhausted_count: u64,
    /// Idle connections found dead on checkout
    pub health_check_failures: u64,
}

impl PoolStats {
    /// Connections currently checked out
    pub fn outstanding(&self) -> u64 {
        self.checkouts.saturating_sub(self.checkins)
    }
}

/// Atomic pool stats for concurrent updates
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicPoolStats {
    pub connections_created: AtomicU64,
    pub connections_terminated: AtomicU64,
    pub checkouts: AtomicU64,
    pub checkins: AtomicU64,
    pub exhausted_count: AtomicU64,
    pub health_check_failures: AtomicU64,
}

impl AtomicPoolStats {
    /// Create new atomic stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection creation
    pub fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection termination
    pub fn record_terminated(&self) {
        self.connections_terminated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a checkout
    pub fn record_checkout(&self) {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a checkin
    pub fn record_checkin(&self) {
        self.checkins.fetch_add(1, Ordering::Relaxed);
    }

    /// Record pool exhaustion
    pub fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record health check failure
    pub fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current stats
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_terminated: self.connections_terminated.load(Ordering::Relaxed),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            checkins: self.checkins.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
        }
    }
}

/// Releases the process-wide name reservation when the pool goes away
struct NameReservation(String);

impl NameReservation {
    fn acquire(name: &str) -> Result<Self> {
        let mut names = POOL_NAMES.lock();
        if !names.insert(name.to_string()) {
            return Err(Error::config(format!(
                "A pool named '{}' already exists in this process",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }
}

impl Drop for NameReservation {
    fn drop(&mut self) {
        POOL_NAMES.lock().remove(&self.0);
    }
}

/// A fixed-size, named connection pool
pub struct NamedPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    params: ConnectionParameters,
    /// Idle connections (LIFO)
    idle: Mutex<Vec<Box<dyn Connection>>>,
    /// One permit per connection not checked out
    permits: Arc<Semaphore>,
    stats: AtomicPoolStats,
    shutdown: AtomicBool,
    _name: NameReservation,
}

impl std::fmt::Debug for NamedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPool")
            .field("config", &self.config)
            .field("params", &self.params)
            .field("available", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl NamedPool {
    /// Create the pool and open all of its connections.
    ///
    /// Fails if the config is invalid, the name is taken, or any connection
    /// cannot be opened. Connections opened before a failure are terminated.
    pub async fn new(
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
        params: ConnectionParameters,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let reservation = NameReservation::acquire(&config.name)?;

        let stats = AtomicPoolStats::new();
        let mut conns: Vec<Box<dyn Connection>> = Vec::with_capacity(config.size);
        for _ in 0..config.size {
            match factory.connect(&params).await {
                Ok(conn) => {
                    stats.record_created();
                    conns.push(conn);
                }
                Err(e) => {
                    for conn in conns {
                        if let Err(te) = conn.terminate().await {
                            warn!(
                                pool = %config.name,
                                error = %te,
                                "Failed to terminate pooled connection"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!(
            pool = %config.name,
            size = config.size,
            driver = %factory.driver_name(),
            "Connection pool created"
        );

        Ok(Arc::new(Self {
            permits: Arc::new(Semaphore::new(config.size)),
            idle: Mutex::new(conns),
            config,
            factory,
            params,
            stats,
            shutdown: AtomicBool::new(false),
            _name: reservation,
        }))
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.config.size
    }

    /// Connections not currently checked out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Connections currently checked out
    pub fn in_use(&self) -> usize {
        self.capacity().saturating_sub(self.available())
    }

    /// Get pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Whether `close()` was called
    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Check out a connection.
    ///
    /// The returned guard must be handed back with [`PooledConnection::release`]
    /// or [`NamedPool::checkin`]; dropping it also returns the connection.
    pub async fn checkout(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let permit = self.acquire_permit().await?;

        // close() may have run while this checkout was waiting
        if self.is_closed() {
            drop(permit);
            self.stats.record_exhausted();
            return Err(self.closed_error());
        }

        let conn = match self.take_idle().await {
            Ok(conn) => conn,
            Err(e) => {
                drop(permit);
                return Err(e);
            }
        };

        self.stats.record_checkout();
        debug!(pool = %self.name(), available = self.available(), "Connection checked out");

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            permit: Some(permit),
        })
    }

    /// Return a checked-out connection to the pool
    pub async fn checkin(&self, mut conn: PooledConnection) {
        if let (Some(c), Some(permit)) = (conn.conn.take(), conn.permit.take()) {
            self.return_connection(c, permit).await;
        }
    }

    /// Terminate idle connections and refuse further checkouts.
    ///
    /// Connections still checked out are terminated when they come back.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        self.permits.close();

        let mut idle = self.idle.lock().await;
        for conn in idle.drain(..) {
            self.discard(conn).await;
        }

        info!(pool = %self.name(), "Connection pool closed");
        Ok(())
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let permits = Arc::clone(&self.permits);
        let acquired = match self.config.acquire_timeout {
            None => permits.try_acquire_owned().map_err(|e| match e {
                TryAcquireError::Closed => self.closed_error(),
                TryAcquireError::NoPermits => Error::pool_exhausted(
                    self.name(),
                    format!("all {} connections are checked out", self.capacity()),
                ),
            }),
            Some(timeout) => match tokio::time::timeout(timeout, permits.acquire_owned()).await {
                Ok(Ok(permit)) => Ok(permit),
                Ok(Err(_)) => Err(self.closed_error()),
                Err(_) => Err(Error::pool_exhausted(
                    self.name(),
                    format!("timed out after {}ms", timeout.as_millis()),
                )),
            },
        };

        if acquired.is_err() {
            self.stats.record_exhausted();
        }
        acquired
    }

    /// Pop an idle connection, replacing it when it fails the liveness check
    async fn take_idle(&self) -> Result<Box<dyn Connection>> {
        let conn = self.idle.lock().await.pop();

        match conn {
            Some(conn) if !self.config.test_on_checkout || conn.is_connected().await => Ok(conn),
            Some(dead) => {
                self.stats.record_health_check_failure();
                warn!(pool = %self.name(), "Idle connection failed liveness check, replacing");
                self.discard(dead).await;
                self.open_replacement().await
            }
            // A slot whose connection was discarded earlier
            None => self.open_replacement().await,
        }
    }

    /// Open a connection for an empty slot; never on a closed pool
    async fn open_replacement(&self) -> Result<Box<dyn Connection>> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let conn = self.factory.connect(&self.params).await?;
        self.stats.record_created();
        Ok(conn)
    }

    /// Terminate a connection leaving the pool
    async fn discard(&self, conn: Box<dyn Connection>) {
        if let Err(e) = conn.terminate().await {
            warn!(pool = %self.name(), error = %e, "Failed to terminate pooled connection");
        }
        self.stats.record_terminated();
    }

    fn closed_error(&self) -> Error {
        Error::pool_exhausted(self.name(), "pool is closed")
    }

    async fn return_connection(&self, conn: Box<dyn Connection>, permit: OwnedSemaphorePermit) {
        self.stats.record_checkin();

        // Flag checked under the idle lock so close() cannot miss this connection
        let mut idle = self.idle.lock().await;
        if self.is_closed() {
            drop(idle);
            self.discard(conn).await;
        } else {
            idle.push(conn);
            drop(idle);
        }

        // Permit goes back only after the connection is idle again
        drop(permit);
        debug!(pool = %self.name(), available = self.available(), "Connection checked in");
    }
}

/// A connection checked out from a [`NamedPool`]
///
/// Derefs to [`Connection`]. Calling [`Connection::terminate`] through the
/// guard ends the underlying session; to give the connection back use
/// [`release`](Self::release).
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<NamedPool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    /// Name of the pool this connection belongs to
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// Return the connection to its pool
    pub async fn release(mut self) {
        if let (Some(conn), Some(permit)) = (self.conn.take(), self.permit.take()) {
            self.pool.return_connection(conn, permit).await;
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name())
            .field("returned", &self.conn.is_none())
            .finish()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        // Only `release`/`checkin` empty the slot, and both consume the guard
        match self.conn.as_deref() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let (Some(conn), Some(permit)) = (self.conn.take(), self.permit.take()) {
            let pool = Arc::clone(&self.pool);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        pool.return_connection(conn, permit).await;
                    });
                }
                Err(_) => {
                    // No runtime to return on; free the slot so capacity is kept
                    pool.stats.record_checkin();
                    drop(conn);
                    drop(permit);
                }
            }
        }
    }
}
