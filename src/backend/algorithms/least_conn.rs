//! Least-connections load balancing algorithm.

use super::LoadBalancer;
use crate::backend::Backend;
use parking_lot::Mutex;
use std::sync::Arc;

/// Least-connections load balancer.
///
/// Sends requests to the alive backend with the fewest in-flight requests.
/// Ties go to the backend listed first. The winner's counter is raised as
/// part of the selection; every selection must be paired with one
/// [`LoadBalancer::on_request_complete`] call.
pub struct LeastConnections {
    /// Serialises selections so two callers never both see the same minimum.
    lock: Mutex<()>,
}

impl LeastConnections {
    /// Create a new least-connections load balancer.
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }
}

impl Default for LeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for LeastConnections {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let _guard = self.lock.lock();

        let mut min_conns = usize::MAX;
        let mut selected = None;

        for backend in backends {
            if !backend.is_alive() {
                continue;
            }
            let conns = backend.active_connections();
            if conns < min_conns {
                min_conns = conns;
                selected = Some(backend);
            }
        }

        let backend = selected?;
        backend.increment_active_connections();
        Some(Arc::clone(backend))
    }

    fn on_request_complete(&self, backend: &Backend) {
        backend.decrement_active_connections();
    }
}
