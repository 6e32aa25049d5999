//! Database facade
//!
//! Composes a [`ConnectionProvider`], an optional [`NamedPool`] and a
//! [`DatabaseApi`] behind one setup call:
//!
//! ```rust,ignore
//! let db = Database::with_pool(factory, params, SqlApi::new(), PoolConfig::new("p1")).await?;
//! db.connect_api_to_database().await?;
//! db.api().execute_using_pool("DELETE FROM carts WHERE id = $id", &values).await?;
//! ```

use std::sync::Arc;
use tracing::info;

use crate::api::DatabaseApi;
use crate::config::DatabaseConfig;
use crate::connection::ConnectionFactory;
use crate::error::Result;
use crate::params::ConnectionParameters;
use crate::pool::{NamedPool, PoolConfig};
use crate::provider::{ConnectionProvider, ProviderState};

/// Which connection resources a [`Database`] manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Only the single provider-owned connection
    SingleConnection,
    /// Single connection plus a named pool
    Pooled,
}

/// A database: provider, optional pool and API delegate
pub struct Database<A> {
    provider: ConnectionProvider,
    pool: Option<Arc<NamedPool>>,
    api: Arc<A>,
}

impl<A> std::fmt::Debug for Database<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("provider", &self.provider)
            .field("pool", &self.pool.as_ref().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}

impl<A: DatabaseApi> Database<A> {
    /// Single-connection database. Nothing is opened until first use.
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        params: ConnectionParameters,
        api: A,
    ) -> Self {
        Self {
            provider: ConnectionProvider::new(factory, params),
            pool: None,
            api: Arc::new(api),
        }
    }

    /// Pooled database. The pool is opened now and construction fails if it
    /// cannot be; the single connection is still opened lazily.
    pub async fn with_pool(
        factory: Arc<dyn ConnectionFactory>,
        params: ConnectionParameters,
        api: A,
        pool_config: PoolConfig,
    ) -> Result<Self> {
        let pool = NamedPool::new(pool_config, Arc::clone(&factory), params.clone()).await?;
        Ok(Self {
            provider: ConnectionProvider::new(factory, params),
            pool: Some(pool),
            api: Arc::new(api),
        })
    }

    /// Build from configuration; a `pool` section selects the pooled variant
    pub async fn from_config(
        config: &DatabaseConfig,
        factory: Arc<dyn ConnectionFactory>,
        api: A,
    ) -> Result<Self> {
        config.validate()?;
        let params = config.connection_parameters()?;
        match &config.pool {
            Some(pool_config) => Self::with_pool(factory, params, api, pool_config.clone()).await,
            None => Ok(Self::new(factory, params, api)),
        }
    }

    /// Wire the API to the single connection (opening it if needed) and the pool
    pub async fn connect_api_to_database(&self) -> Result<()> {
        let connection = self.provider.get_connection().await?;
        self.api.wire(connection, self.pool.clone());
        info!(
            mode = ?self.mode(),
            pool = self.pool.as_ref().map(|p| p.name()).unwrap_or("-"),
            "Database API connected"
        );
        Ok(())
    }

    /// Terminate the single connection (if one was opened) and close the pool
    pub async fn shutdown(&self) -> Result<()> {
        if self.provider.state().await == ProviderState::Connected {
            self.provider.close().await?;
        }
        if let Some(pool) = &self.pool {
            pool.close().await?;
        }
        Ok(())
    }
}

impl<A> Database<A> {
    /// The API delegate
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Shared handle to the API delegate
    pub fn api_handle(&self) -> Arc<A> {
        Arc::clone(&self.api)
    }

    /// The single-connection provider
    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    /// The pool, when running in pooled mode
    pub fn pool(&self) -> Option<&Arc<NamedPool>> {
        self.pool.as_ref()
    }

    /// Access mode selected at construction
    pub fn mode(&self) -> AccessMode {
        if self.pool.is_some() {
            AccessMode::Pooled
        } else {
            AccessMode::SingleConnection
        }
    }
}
