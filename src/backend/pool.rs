//! The service pool: backends plus the active selection strategy.

use crate::backend::Backend;
use crate::backend::algorithms::{LoadBalancer, for_strategy};
use crate::config::{ServiceConfig, Strategy, check_service_url};
use crate::health::tcp_health_check;
use crate::proxy::HttpForwarder;
use hyper::Uri;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors building a pool. All of them are configuration errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no services configured")]
    NoServices,

    #[error("invalid service address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Load balanced services and the strategy choosing between them.
///
/// The backend list is fixed at construction. Strategies are handed this
/// same list on every selection, so liveness and counter updates are seen
/// immediately.
pub struct ServicePool {
    /// Backends in configuration order.
    backends: Vec<Arc<Backend>>,
    /// Strategy in use.
    strategy: Strategy,
    /// Its implementation.
    balancer: Box<dyn LoadBalancer>,
}

impl ServicePool {
    /// Create a pool over `backends` using `strategy`.
    pub fn new(backends: Vec<Backend>, strategy: Strategy) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::NoServices);
        }

        for backend in &backends {
            info!(
                name = %backend.name(),
                address = %backend.address(),
                weight = backend.weight(),
                "configured service"
            );
        }
        info!(strategy = %strategy, "load distribution strategy");

        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            strategy,
            balancer: for_strategy(strategy),
        })
    }

    /// Build HTTP backends for the configured services.
    pub fn from_config(
        services: &[ServiceConfig],
        strategy: Strategy,
        connect_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let backends = services
            .iter()
            .map(|service| {
                let address = check_service_url(&service.url).map_err(|reason| {
                    PoolError::InvalidAddress {
                        address: service.url.clone(),
                        reason,
                    }
                })?;
                let forwarder =
                    HttpForwarder::new(address.clone(), &service.name, connect_timeout)?;
                Backend::new(address, &service.name, service.weight, Arc::new(forwarder))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(backends, strategy)
    }

    /// All backends in configuration order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Strategy in use.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Select the backend for the next request, or None if none is alive.
    pub fn next_backend(&self) -> Option<Arc<Backend>> {
        self.balancer.select(&self.backends)
    }

    /// Report that a request to a selected backend has finished.
    ///
    /// Must be called exactly once per successful [`next_backend`](Self::next_backend).
    pub fn complete(&self, backend: &Backend) {
        self.balancer.on_request_complete(backend);
    }

    /// Set liveness of the backend with this address. Unknown addresses are ignored.
    pub fn mark_backend_status(&self, address: &Uri, alive: bool) {
        if let Some(backend) = self.backends.iter().find(|b| b.address() == address) {
            backend.set_alive(alive);
            debug!(backend = %address, alive, "backend status updated");
        }
    }

    /// Probe every backend in turn and record whether it accepts TCP connections.
    pub async fn run_health_check(&self, probe_timeout: Duration) {
        for backend in &self.backends {
            match tcp_health_check(backend.authority(), probe_timeout).await {
                Ok(()) => {
                    backend.set_alive(true);
                    info!(backend = %backend.address(), status = "up", "health check");
                }
                Err(e) => {
                    backend.set_alive(false);
                    warn!(
                        backend = %backend.address(),
                        status = "down",
                        error = %e,
                        "health check"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ServicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePool")
            .field("backends", &self.backends)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
