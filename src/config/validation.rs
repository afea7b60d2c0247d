//! Configuration validation.

use crate::config::Config;
use hyper::Uri;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one service
/// - Service URLs that parse, use `http` and name a host
/// - No duplicate service URLs
/// - A non-zero listen port, health check interval and timeouts
/// - A non-zero body size limit
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.services.is_empty() {
        errors.push("at least one service must be defined".to_string());
    }

    let mut urls = HashSet::new();
    for service in &config.services {
        if let Err(reason) = check_service_url(&service.url) {
            errors.push(format!("service '{}': {}", service.url, reason));
        }

        if !urls.insert(service.url.as_str()) {
            errors.push(format!("duplicate service url: {}", service.url));
        }
    }

    if config.port == 0 {
        errors.push("listen port must be greater than 0".to_string());
    }

    if config.health_check_in_sec == 0 {
        errors.push("health check interval must be at least 1 second".to_string());
    }

    if config.health_check_timeout.is_zero() {
        errors.push("health check timeout must be greater than 0".to_string());
    }

    if config.connect_timeout.is_zero() {
        errors.push("connect timeout must be greater than 0".to_string());
    }

    if config.max_body_size == 0 {
        errors.push("max body size must be greater than 0".to_string());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Check that a service URL can be forwarded to.
pub(crate) fn check_service_url(url: &str) -> Result<Uri, String> {
    let uri: Uri = url.parse().map_err(|e| format!("invalid url: {}", e))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(format!(
                "unsupported scheme '{}', only http is supported",
                other
            ));
        }
        None => return Err("missing scheme, expected http://".to_string()),
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }

    Ok(uri)
}
