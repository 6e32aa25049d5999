//! Single-connection provider
//!
//! Owns one non-pooled connection and its lifecycle:
//!
//! ```text
//! Uninitialized --connect()/get_connection()--> Connected --close()--> Closed
//!                                                   ^                     |
//!                                                   +------connect()------+
//! ```
//!
//! `get_connection()` is the only read path. It connects lazily from
//! `Uninitialized` and refuses to resurrect a `Closed` provider.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::params::ConnectionParameters;

/// Observable provider state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderState {
    /// No connection created yet
    Uninitialized,
    /// Holding a live connection
    Connected,
    /// Connection terminated; only `connect()` leaves this state
    Closed,
}

enum Slot {
    Uninitialized,
    Connected(Arc<dyn Connection>),
    Closed,
}

impl Slot {
    fn state(&self) -> ProviderState {
        match self {
            Self::Uninitialized => ProviderState::Uninitialized,
            Self::Connected(_) => ProviderState::Connected,
            Self::Closed => ProviderState::Closed,
        }
    }
}

/// Manages exactly one non-pooled connection
pub struct ConnectionProvider {
    factory: Arc<dyn ConnectionFactory>,
    params: ConnectionParameters,
    slot: Mutex<Slot>,
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("driver", &self.factory.driver_name())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ConnectionProvider {
    /// Create a provider; no connection is opened until first use
    pub fn new(factory: Arc<dyn ConnectionFactory>, params: ConnectionParameters) -> Self {
        Self {
            factory,
            params,
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    /// Open a connection through the factory and hold it.
    ///
    /// A previously held connection is replaced but not terminated, since it
    /// may still be wired into an API.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let conn = self.open().await?;
        if matches!(*slot, Slot::Connected(_)) {
            warn!(
                driver = %self.factory.driver_name(),
                "Replacing held connection without terminating it"
            );
        }
        *slot = Slot::Connected(conn);
        Ok(())
    }

    /// Return the held connection, connecting first if none was created yet
    pub async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Connected(conn) => Ok(Arc::clone(conn)),
            Slot::Uninitialized => {
                let conn = self.open().await?;
                *slot = Slot::Connected(Arc::clone(&conn));
                Ok(conn)
            }
            Slot::Closed => Err(Error::not_connected(
                "connection was closed; call connect() to reopen",
            )),
        }
    }

    /// Terminate the held connection.
    ///
    /// Like `get_connection()`, this connects first when nothing was created
    /// yet, so an unused provider still exercises its factory once.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let conn = match &*slot {
            Slot::Connected(conn) => Arc::clone(conn),
            Slot::Uninitialized => self.open().await?,
            Slot::Closed => return Err(Error::not_connected("connection already closed")),
        };
        *slot = Slot::Closed;
        drop(slot);

        conn.terminate().await?;
        debug!(driver = %self.factory.driver_name(), "Connection terminated");
        Ok(())
    }

    /// The connect function used by this provider
    pub fn connect_method(&self) -> Arc<dyn ConnectionFactory> {
        Arc::clone(&self.factory)
    }

    /// The parameters used to open connections
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ProviderState {
        self.slot.lock().await.state()
    }

    async fn open(&self) -> Result<Arc<dyn Connection>> {
        let conn = self.factory.connect(&self.params).await?;
        debug!(driver = %self.factory.driver_name(), "Connection established");
        Ok(Arc::from(conn))
    }
}
