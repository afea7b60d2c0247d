//! Periodic health checking of backend services.

mod checker;

pub use checker::{HealthChecker, tcp_health_check};
