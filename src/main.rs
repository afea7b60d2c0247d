//! lbpool - an HTTP reverse proxy load balancer
//!
//! Usage:
//!     lbpool --file <path>
//!     lbpool --services http://10.0.0.1:8080,http://10.0.0.2:8080 --port 8000
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use lbpool::backend::ServicePool;
use lbpool::config::{Config, ConfigOverrides, Strategy, resolve_config};
use lbpool::frontend::FrontendListener;
use lbpool::health::HealthChecker;
use lbpool::util::init_logging;

/// An HTTP reverse proxy load balancer.
#[derive(Parser, Debug)]
#[command(name = "lbpool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    file: PathBuf,

    /// Comma separated service URLs, used when the file lists none
    #[arg(long, value_name = "URLS")]
    services: Option<String>,

    /// Port to listen on, used when the file sets none
    #[arg(long, default_value_t = 80)]
    port: u16,

    /// Load distribution strategy, used when the file sets none
    #[arg(long, default_value = "round-robin")]
    strategy: Strategy,

    /// Seconds between health checks, used when the file sets none
    #[arg(long, default_value_t = 20)]
    health_check_in_sec: u64,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        services: cli.services.clone(),
        port: cli.port,
        strategy: cli.strategy,
        health_check_in_sec: cli.health_check_in_sec,
    };

    let config = resolve_config(&cli.file, &overrides).with_context(|| {
        format!("failed to load configuration from '{}'", cli.file.display())
    })?;

    // CLI overrides config
    let log_level = cli.log_level.as_deref().unwrap_or(&config.global.log_level);

    init_logging(log_level, config.global.log_format).context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Port: {}", config.port);
        println!("  Strategy: {}", config.strategy());
        println!("  Health check interval: {}s", config.health_check_in_sec);
        println!("  Max body size: {} bytes", config.max_body_size);
        println!("  Services: {}", config.services.len());
        for service in &config.services {
            println!("    - {} ({}) weight {}", service.name, service.url, service.weight);
        }
        return Ok(());
    }

    info!(
        config_path = %cli.file.display(),
        port = config.port,
        services = config.services.len(),
        "lbpool starting"
    );

    run(config)
}

/// Run the load balancer with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(config))
}

/// Async entry point for the load balancer.
async fn run_async(config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let pool = Arc::new(
        ServicePool::from_config(&config.services, config.strategy(), config.connect_timeout)
            .context("failed to build service pool")?,
    );

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = FrontendListener::bind(addr, Arc::clone(&pool), config.max_body_size)
        .await
        .with_context(|| format!("failed to bind listener on {}", addr))?;

    let listener_handle = tokio::spawn(listener.run(shutdown_tx.subscribe()));

    let checker = HealthChecker::new(
        Arc::clone(&pool),
        config.health_check_interval(),
        config.health_check_timeout,
    );
    let checker_handle = tokio::spawn(checker.run(shutdown_tx.subscribe()));

    info!(listen = %addr, "lbpool is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    let _ = shutdown_tx.send(());
    let _ = listener_handle.await;
    let _ = checker_handle.await;

    info!("lbpool shut down complete");
    Ok(())
}
