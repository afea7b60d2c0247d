//! Configuration loading, parsing, and validation.

mod loader;
mod types;
mod validation;

pub use loader::{ConfigError, ConfigOverrides, apply_overrides, load_config, resolve_config};
pub use types::*;
pub use validation::validate_config;
pub(crate) use validation::check_service_url;
