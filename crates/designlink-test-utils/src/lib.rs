//! Testing utilities, fixtures, and mocks for designlink.
//!
//! - **Mocks**: an in-memory [`MockTransport`] and a scripted
//!   [`MockTokenProvider`]
//! - **Fixtures**: JSON-RPC and SSE response bodies, temporary config
//!   directories
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use designlink_test_utils::{fixtures, MockTransport};
//!
//! #[tokio::test]
//! async fn test_call() {
//!     let transport = MockTransport::new()
//!         .with_tool_result("get_design_data", fixtures::text_result("{}"));
//!     transport.connect().await.unwrap();
//!     assert_eq!(transport.calls().len(), 0);
//! }
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::TestConfigDir;
pub use mocks::{MockTokenProvider, MockTransport};
