//! Core runtime for designlink.
//!
//! This crate ties the transports together:
//!
//! - [`SessionManager`]: per-owner sessions, each owning one connected
//!   transport, with an idle sweep
//! - [`CircuitBreakerRegistry`]: failure isolation keyed by operation name
//! - [`Config`]: layered JSON configuration
//! - [`ConfiguredTransportFactory`]: builds Local, Remote or Proxy
//!   transports from config, running discovery when needed
//!
//! # Example
//!
//! ```no_run
//! use designlink_core::{
//!     CircuitBreakerRegistry, Config, ConfiguredTransportFactory, SessionManager,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (config, _sources) = Config::load(None).await?;
//! let factory = ConfiguredTransportFactory::new(
//!     config.transport_config(),
//!     config.discovery_config(),
//! );
//! let manager = Arc::new(SessionManager::new(Arc::new(factory), config.session_config()));
//! let _sweeper = manager.start_sweeper();
//!
//! let breakers = CircuitBreakerRegistry::new(config.breaker_config());
//! let session = manager.create_session("user-1", None).await?;
//! let result = breakers
//!     .execute("get_design_data", || {
//!         session.call_tool("get_design_data", serde_json::json!({"nodeId": "1:2"}))
//!     })
//!     .await?;
//! println!("{}", result.text());
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod factory;
pub mod session;

pub use breaker::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use config::{Config, DiscoverySettings, LogLevel, SessionConfig, TransportConfig};
pub use error::{BreakerError, ConfigError, CoreError, CoreResult};
pub use factory::{ConfiguredTransportFactory, TransportFactory};
pub use session::{Session, SessionManager, SessionSummary};
