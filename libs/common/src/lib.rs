//! Shared service plumbing (basic library)
//!
//! Provides functions shared by the ticketing services:
//! - logging bootstrap (console + optional rolling file)
//! - layered configuration loading (defaults, YAML file, environment)
//! - graceful shutdown signal handling

pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use config_loader::{load_layered, ConfigError};
pub use logging::{init_with_config, LogConfig};
pub use shutdown::{cancel_on_shutdown, wait_for_shutdown};

// Re-export common dependencies
pub use tokio;
pub use tokio_util::sync::CancellationToken;
