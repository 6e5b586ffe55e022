//! Logging initialization.

use designlink_core::LogLevel;
use designlink_util::log::{self, LogConfig};

/// Initialize stderr logging.
///
/// `--verbose` forces debug; otherwise the configured level applies, and
/// warnings only when nothing is configured. `RUST_LOG` overrides both.
pub fn init_logging(verbose: bool, configured: Option<LogLevel>) {
    let level = if verbose {
        log::LogLevel::Debug
    } else {
        configured.map(Into::into).unwrap_or(log::LogLevel::Warn)
    };

    log::init(LogConfig {
        print: true,
        level,
        include_location: verbose,
    });
}
