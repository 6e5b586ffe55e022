//! Local MCP endpoint discovery for designlink.
//!
//! This crate locates the MCP server that the desktop design application
//! runs on the user's machine. Candidates come from, in order:
//!
//! - the `DESIGNLINK_MCP_PORT` override (one port or a comma-separated list)
//! - platform configuration (registry, macOS preferences, settings files)
//! - listening sockets owned by the application, plus the default ports
//!
//! Every candidate is verified before it is trusted.
//!
//! ```no_run
//! # async fn example() {
//! use designlink_discover::Discovery;
//!
//! let result = Discovery::from_env().discover().await;
//! if let Some(port) = result.port {
//!     println!("MCP endpoint on port {port} ({})", result.method);
//! }
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod platform;
pub mod result;
pub mod scan;
pub mod verify;

pub use config::{DiscoveryConfig, DEFAULT_PATH, DEFAULT_PORTS, PORT_ENV_VAR};
pub use discovery::Discovery;
pub use error::DiscoverError;
pub use result::{DiscoveryMethod, DiscoveryResult};
pub use verify::verify_port;
