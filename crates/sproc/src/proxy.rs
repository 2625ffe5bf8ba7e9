//! Contract proxies
//!
//! A proxy is a connection handle, a timeout and a shared dispatch table.
//! Creating one never compiles anything twice, and every method of the
//! contract is a thin forwarder into [`Proxy::invoke`] or [`Proxy::invoke_async`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use sproc_core::{Connection, Result, SprocError};

use crate::config::ProxyConfig;
use crate::convert::{Arg, FromResult};
use crate::describe::Contract;
use crate::executor;
use crate::plan::ProcedureCallPlan;
use crate::registry::{DispatchTable, PlanRegistry};

/// An object implementing contract `C` by calling stored procedures
pub struct Proxy<C: ?Sized> {
    connection: Arc<dyn Connection>,
    timeout: Duration,
    table: Arc<DispatchTable>,
    _contract: PhantomData<fn() -> Box<C>>,
}

impl<C: ?Sized> Clone for Proxy<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            timeout: self.timeout,
            table: Arc::clone(&self.table),
            _contract: PhantomData,
        }
    }
}

impl<C: ?Sized> fmt::Debug for Proxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("contract", &self.table.contract())
            .field("driver", &self.connection.driver_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<C: ?Sized> Proxy<C> {
    /// Timeout applied to every command
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connection the proxy issues commands on
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Shared dispatch table of the contract
    pub fn dispatch_table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    fn plan(&self, method: &str) -> Result<&Arc<ProcedureCallPlan>> {
        self.table.get(method).ok_or_else(|| {
            SprocError::Internal(format!(
                "{} has no compiled plan for method {}",
                self.table.contract(),
                method
            ))
        })
    }

    /// Call `method` synchronously, decoding the result as `T`
    pub fn invoke<T: FromResult>(&self, method: &str, mut args: Vec<Arg<'_>>) -> Result<T> {
        let plan = self.plan(method)?;
        executor::execute(plan, self.connection.as_ref(), self.timeout, &mut args)
    }

    /// Call `method` asynchronously, decoding the result as `T`
    pub async fn invoke_async<T: FromResult>(
        &self,
        method: &str,
        mut args: Vec<Arg<'static>>,
    ) -> Result<T> {
        let plan = Arc::clone(self.plan(method)?);
        executor::execute_async(&plan, self.connection.as_ref(), self.timeout, &mut args).await
    }
}

/// Creates proxies from one registry
#[derive(Debug, Clone)]
pub struct ProxyFactory {
    registry: Arc<PlanRegistry>,
}

impl ProxyFactory {
    /// A factory with its own registry and naming rules
    pub fn new(config: ProxyConfig) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(PlanRegistry::new(config)?),
        })
    }

    /// A factory backed by the process-wide registry
    pub fn global() -> Self {
        Self {
            registry: PlanRegistry::global(),
        }
    }

    pub fn registry(&self) -> &Arc<PlanRegistry> {
        &self.registry
    }

    /// Create a proxy using the configured command timeout
    pub fn create<C: Contract + ?Sized>(&self, connection: Arc<dyn Connection>) -> Result<Proxy<C>> {
        let timeout = self.registry.config().command_timeout();
        self.create_with_timeout(Some(connection), timeout)
    }

    /// Create a proxy with an explicit timeout.
    ///
    /// A missing connection fails before any plan work is done.
    pub fn create_with_timeout<C: Contract + ?Sized>(
        &self,
        connection: Option<Arc<dyn Connection>>,
        timeout: Duration,
    ) -> Result<Proxy<C>> {
        let connection = connection.ok_or_else(|| {
            SprocError::Precondition("a connection is required to generate a proxy".to_string())
        })?;
        let table = self.registry.dispatch_table::<C>()?;
        Ok(Proxy {
            connection,
            timeout,
            table,
            _contract: PhantomData,
        })
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::global()
    }
}

/// Create a proxy for `C` from the process-wide registry
pub fn generate_proxy<C: Contract + ?Sized>(
    connection: Option<Arc<dyn Connection>>,
    timeout: Duration,
) -> Result<Proxy<C>> {
    ProxyFactory::global().create_with_timeout(connection, timeout)
}

/// Proxy creation directly from a connection handle
pub trait ConnectionExt {
    /// Create a proxy with the default 30 second timeout
    fn generate_proxy<C: Contract + ?Sized>(&self) -> Result<Proxy<C>>;

    fn generate_proxy_with_timeout<C: Contract + ?Sized>(
        &self,
        timeout: Duration,
    ) -> Result<Proxy<C>>;
}

impl ConnectionExt for Arc<dyn Connection> {
    fn generate_proxy<C: Contract + ?Sized>(&self) -> Result<Proxy<C>> {
        ProxyFactory::global().create(Arc::clone(self))
    }

    fn generate_proxy_with_timeout<C: Contract + ?Sized>(
        &self,
        timeout: Duration,
    ) -> Result<Proxy<C>> {
        generate_proxy(Some(Arc::clone(self)), timeout)
    }
}
