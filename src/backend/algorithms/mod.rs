//! Load balancing algorithms.

mod least_conn;
mod round_robin;
mod weighted;

pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;

use crate::backend::Backend;
use crate::config::Strategy;
use std::sync::Arc;

/// Trait for load balancing algorithms.
///
/// Implementations receive the pool's own backend list on every call and
/// must never return a backend that is not alive.
pub trait LoadBalancer: Send + Sync {
    /// Select the next backend.
    ///
    /// # Returns
    ///
    /// The selected backend, or None if no backend is alive.
    fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    /// Notify that a request sent to `backend` has completed.
    fn on_request_complete(&self, _backend: &Backend) {}
}

/// Build the balancer for a configured strategy.
pub fn for_strategy(strategy: Strategy) -> Box<dyn LoadBalancer> {
    match strategy {
        Strategy::RoundRobin => Box::new(RoundRobin::new()),
        Strategy::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
        Strategy::LeastConnections => Box::new(LeastConnections::new()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::backend::Backend;
    use crate::proxy::testing::StaticForwarder;
    use std::sync::Arc;

    /// Backends on ports 8001.. with the given weights.
    pub fn weighted_backends(weights: &[u32]) -> Vec<Arc<Backend>> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &weight)| {
                let url = format!("http://127.0.0.1:{}", 8001 + i);
                let name = format!("s{}", i + 1);
                let forwarder = StaticForwarder::ok("ok");
                Arc::new(Backend::new(url.parse().unwrap(), name, weight, forwarder).unwrap())
            })
            .collect()
    }

    /// `n` backends of weight 1.
    pub fn backends(n: usize) -> Vec<Arc<Backend>> {
        weighted_backends(&vec![1; n])
    }

    /// Index of `selected` within `backends`.
    pub fn index_of(backends: &[Arc<Backend>], selected: &Arc<Backend>) -> usize {
        backends
            .iter()
            .position(|b| Arc::ptr_eq(b, selected))
            .unwrap()
    }
}
