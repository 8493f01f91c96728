//! Logging macros with verbosity level control, backed by `tracing`.
//!
//! Verbosity levels:
//! - 0: SILENT (only warnings and errors)
//! - 1: CHANGES (stage results: project end, path length)
//! - 2: CHECKS (per-task decisions during path extraction)
//! - 3: DEBUG (full algorithm internals)
//!
//! The macros decide *whether* to emit; the installed subscriber decides
//! where output goes. Logs go to stderr.

use tracing::Level;

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Environment variable consulted when no explicit level is given.
pub const LOG_ENV_VAR: &str = "PAVEL_LOG";

/// Log at CHANGES level (verbosity >= 1).
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!($($arg)*);
        }
    };
}

/// Install a global stderr subscriber.
///
/// Level priority: `level` argument, then `PAVEL_LOG`, then `info`.
/// Returns false when a subscriber was already installed.
pub fn init_logging(level: Option<&str>) -> bool {
    let level = level
        .and_then(parse_level_str)
        .or_else(|| {
            std::env::var(LOG_ENV_VAR)
                .ok()
                .and_then(|s| parse_level_str(&s))
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
