//! Smooth weighted round-robin load balancing algorithm.

use super::LoadBalancer;
use crate::backend::Backend;
use parking_lot::Mutex;
use std::sync::Arc;

/// Smooth weighted round-robin load balancer.
///
/// Every selection raises each alive backend's running weight by its static
/// weight, serves the backend with the highest running weight and lowers the
/// winner by the sum of alive weights. Backends are served in proportion to
/// their weight without bursts of the heaviest one.
pub struct WeightedRoundRobin {
    /// Serialises selections; the running total spans all backends.
    lock: Mutex<()>,
}

impl WeightedRoundRobin {
    /// Create a new weighted round-robin load balancer.
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }
}

impl Default for WeightedRoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let _guard = self.lock.lock();

        let mut total_weight: i64 = 0;
        let mut selected: Option<(&Arc<Backend>, i64)> = None;

        for backend in backends {
            if !backend.is_alive() {
                continue;
            }

            let current = backend.raise_current_weight();
            total_weight += i64::from(backend.weight());

            if selected.is_none_or(|(_, max)| current > max) {
                selected = Some((backend, current));
            }
        }

        let (backend, _) = selected?;
        backend.lower_current_weight(total_weight);
        Some(Arc::clone(backend))
    }
}
