//! Command handlers for the designlink CLI.

pub mod config;
pub mod discover;
pub mod logging;
pub mod tools;

pub use config::*;
pub use discover::*;
pub use logging::*;
pub use tools::*;

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Environment variable consulted when `--token` is not given.
pub const TOKEN_ENV_VAR: &str = "DESIGNLINK_TOKEN";

/// Explicit token, else `$DESIGNLINK_TOKEN`.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
        .filter(|t| !t.is_empty())
}
