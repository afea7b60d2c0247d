//! A single upstream service and its mutable selection state.

use crate::backend::PoolError;
use crate::proxy::{Forward, ForwardError, ProxyBody};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, Uri};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Default port for `http` services without an explicit one.
const DEFAULT_HTTP_PORT: u16 = 80;

/// One load balanced service.
///
/// Identity is fixed at construction. Liveness and the counters used by the
/// strategies live behind a lock owned by this backend alone, so updating one
/// backend never blocks selection or probing of another.
pub struct Backend {
    /// Service URL as configured.
    address: Uri,
    /// `host:port` used for TCP connections.
    authority: String,
    /// Display name.
    name: String,
    /// Static weight, always >= 1.
    weight: u32,
    /// Mutable state.
    state: RwLock<BackendState>,
    /// Forwarding primitive for this service.
    forwarder: Arc<dyn Forward>,
}

#[derive(Debug)]
struct BackendState {
    alive: bool,
    current_weight: i64,
    active_connections: usize,
}

impl Backend {
    /// Create a backend. It starts alive.
    ///
    /// A weight of 0 is treated as 1.
    pub fn new(
        address: Uri,
        name: impl Into<String>,
        weight: u32,
        forwarder: Arc<dyn Forward>,
    ) -> Result<Self, PoolError> {
        let authority = authority_of(&address)?;
        let name = name.into();

        Ok(Self {
            name: if name.is_empty() {
                address.to_string()
            } else {
                name
            },
            address,
            authority,
            weight: weight.max(1),
            state: RwLock::new(BackendState {
                alive: true,
                current_weight: 0,
                active_connections: 0,
            }),
            forwarder,
        })
    }

    /// Service URL.
    pub fn address(&self) -> &Uri {
        &self.address
    }

    /// `host:port` of the service.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static weight.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Set liveness.
    pub fn set_alive(&self, alive: bool) {
        self.state.write().alive = alive;
    }

    /// Whether the backend may be selected.
    pub fn is_alive(&self) -> bool {
        self.state.read().alive
    }

    /// Running weight of the smooth weighted round robin.
    pub fn current_weight(&self) -> i64 {
        self.state.read().current_weight
    }

    /// Number of selections not yet completed.
    pub fn active_connections(&self) -> usize {
        self.state.read().active_connections
    }

    /// Record a new in-flight request.
    pub fn increment_active_connections(&self) {
        self.state.write().active_connections += 1;
    }

    /// Record a finished request. Never goes below zero.
    pub fn decrement_active_connections(&self) {
        let mut state = self.state.write();
        state.active_connections = state.active_connections.saturating_sub(1);
    }

    /// Add the static weight to the running weight and return the new value.
    pub(crate) fn raise_current_weight(&self) -> i64 {
        let mut state = self.state.write();
        state.current_weight += i64::from(self.weight);
        state.current_weight
    }

    /// Charge the backend for having been selected.
    pub(crate) fn lower_current_weight(&self, total: i64) {
        self.state.write().current_weight -= total;
    }

    /// Forward a request to this service.
    pub async fn forward(
        &self,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<ProxyBody>, ForwardError> {
        self.forwarder.forward(req).await
    }

    #[cfg(test)]
    pub(crate) fn set_active_connections(&self, count: usize) {
        self.state.write().active_connections = count;
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

/// Derive the `host:port` to connect to from a service URL.
pub(crate) fn authority_of(address: &Uri) -> Result<String, PoolError> {
    let host = address
        .host()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| PoolError::InvalidAddress {
            address: address.to_string(),
            reason: "missing host".to_string(),
        })?;
    let port = address.port_u16().unwrap_or(DEFAULT_HTTP_PORT);
    Ok(format!("{}:{}", host, port))
}
