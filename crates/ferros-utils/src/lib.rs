//! # Ferros Utilities
//!
//! Shared logging setup for the Ferros workspace, built on `tracing`.

pub mod logging;

// Re-export commonly used logging items for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingConfig, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
