//! lbpool - an HTTP reverse proxy load balancer
//!
//! This crate distributes client requests over a fixed pool of HTTP services:
//! - Round robin, smooth weighted round robin and least connections selection
//! - In-place retries followed by failover to another service
//! - Periodic TCP health checking that revives recovered services

pub mod backend;
pub mod config;
pub mod frontend;
pub mod health;
pub mod proxy;
pub mod util;

pub use config::Config;
