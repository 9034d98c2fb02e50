//! Logging setup.
//!
//! Installs a global `tracing` subscriber that writes to stderr, leaving
//! stdout for JSON results. The filter comes from `EXO_LOG` when set,
//! otherwise from the `-v` count.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

pub const LOG_ENV: &str = "EXO_LOG";

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Install the subscriber. Subsequent calls are no-ops.
pub fn init(verbosity: u8) -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let subscriber = Registry::default()
        .with(build_env_filter(verbosity))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false));
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = INSTALLED.set(());
    Ok(())
}

fn build_env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)))
}

fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_level(0), "info");
        assert_eq!(default_level(1), "debug");
        assert_eq!(default_level(5), "trace");
    }

    #[test]
    fn init_is_idempotent() {
        init(0).unwrap();
        init(2).unwrap();
    }
}
