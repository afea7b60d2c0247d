//! Background health checker.
//!
//! Every interval, runs one sequential TCP reachability pass over the pool.

use crate::backend::ServicePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::info;

/// Health checker that probes every backend of a pool on a fixed interval.
pub struct HealthChecker {
    /// Pool whose backends are probed.
    pool: Arc<ServicePool>,
    /// Time between two passes.
    interval: Duration,
    /// Connect timeout of a single probe.
    probe_timeout: Duration,
}

impl HealthChecker {
    /// Create a new health checker.
    pub fn new(pool: Arc<ServicePool>, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            pool,
            interval,
            probe_timeout,
        }
    }

    /// Run until shutdown. The first pass starts one interval after launch.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval = ?self.interval, "health checker starting");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("starting health check");
                    self.pool.run_health_check(self.probe_timeout).await;
                    let alive = self.pool.backends().iter().filter(|b| b.is_alive()).count();
                    info!(alive, total = self.pool.backends().len(), "health check completed");
                }

                _ = shutdown.recv() => {
                    info!("health checker shutting down");
                    break;
                }
            }
        }
    }
}

/// Perform a TCP health check (just connect).
pub async fn tcp_health_check(authority: &str, check_timeout: Duration) -> Result<(), String> {
    match timeout(check_timeout, TcpStream::connect(authority)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(format!("connection failed: {}", e)),
        Err(_) => Err("connection timeout".to_string()),
    }
}
