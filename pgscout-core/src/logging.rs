//! Shared logging utilities for the pgscout binary.
//!
//! Provides consistent logging configuration across subcommands.

use crate::Result;

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=WARN, 1=INFO, 2+=DEBUG)
/// * `quiet` - If true, only show ERROR level logs
///
/// # Returns
/// Ok(()) if logging was initialized successfully
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        (false, _) => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| {
            crate::error::PgScoutError::configuration(format!(
                "Failed to initialize logging: {}",
                e
            ))
        })?;

    Ok(())
}
