//! Round-robin load balancing algorithm.

use super::LoadBalancer;
use crate::backend::Backend;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin load balancer.
///
/// Distributes requests evenly across alive backends in list order. Dead
/// backends are skipped and the cursor jumps to the backend actually served,
/// so the next call continues right after it.
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    /// Create a new round-robin load balancer.
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    fn next_index(&self, len: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % len
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let len = backends.len();
        if len == 0 {
            return None;
        }

        let start = self.next_index(len);
        for offset in 0..len {
            let idx = (start + offset) % len;
            let backend = &backends[idx];
            if backend.is_alive() {
                if offset != 0 {
                    self.cursor.store(idx, Ordering::Relaxed);
                }
                return Some(Arc::clone(backend));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::algorithms::test_support::{backends, index_of};

    #[test]
    fn test_round_robin_cycles() {
        let rr = RoundRobin::new();
        let servers = backends(3);

        let picks: Vec<usize> = (0..4)
            .map(|_| index_of(&servers, &rr.select(&servers).unwrap()))
            .collect();

        // The cursor starts on the first backend, so the next one is served first.
        assert_eq!(picks, vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_round_robin_even_distribution() {
        let rr = RoundRobin::new();
        let servers = backends(3);
        let mut counts = [0usize; 3];

        for _ in 0..300 {
            let selected = rr.select(&servers).unwrap();
            counts[index_of(&servers, &selected)] += 1;
        }

        assert_eq!(counts, [100, 100, 100]);
    }

    #[test]
    fn test_round_robin_skips_dead() {
        let rr = RoundRobin::new();
        let servers = backends(3);
        servers[1].set_alive(false);

        let mut counts = [0usize; 3];
        for _ in 0..100 {
            let selected = rr.select(&servers).unwrap();
            assert!(selected.is_alive());
            counts[index_of(&servers, &selected)] += 1;
        }

        assert_eq!(counts, [50, 0, 50]);

        // Revived backends rejoin the rotation.
        servers[1].set_alive(true);
        let seen: Vec<usize> = (0..3)
            .map(|_| index_of(&servers, &rr.select(&servers).unwrap()))
            .collect();
        assert!(seen.contains(&1));
    }

    #[test]
    fn test_round_robin_all_dead() {
        let rr = RoundRobin::new();
        let servers = backends(2);
        servers.iter().for_each(|s| s.set_alive(false));
        assert!(rr.select(&servers).is_none());
    }

    #[test]
    fn test_round_robin_empty() {
        let rr = RoundRobin::new();
        assert!(rr.select(&[]).is_none());
    }
}
