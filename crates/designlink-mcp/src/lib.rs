//! Model Context Protocol (MCP) client transports for designlink.
//!
//! Three interchangeable transports reach a design-automation MCP service:
//!
//! - **Local**: an endpoint already listening on this machine (no auth)
//! - **Remote**: a cloud endpoint over HTTPS with bearer-token auth and
//!   one-shot refresh on 401
//! - **Proxy**: an intermediary REST service that owns the real connection
//!
//! All of them implement [`Transport`], so callers pick one at session
//! creation time and never look at the concrete type again.
//!
//! ```text
//! ┌────────────┐   Transport   ┌────────────────┐
//! │  session   │──────────────▶│ Local / Remote │──▶ MCP service
//! │  manager   │               │     / Proxy    │
//! └────────────┘               └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use designlink_mcp::{LocalConfig, LocalTransport, Transport};
//!
//! # async fn example() -> designlink_mcp::McpResult<()> {
//! let transport = LocalTransport::new(LocalConfig::new(3845))?;
//! transport.connect().await?;
//!
//! let tools = transport.list_tools().await?;
//! let result = transport
//!     .call_tool(
//!         "get_design_data",
//!         serde_json::json!({"fileKey": "abc", "nodeId": "1:2"}),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod channel;
mod error;
mod local;
pub mod pending;
pub mod protocol;
mod proxy;
mod remote;
pub mod sse;
mod token;
mod transport;

pub use channel::SessionAffinity;
pub use error::{McpError, McpResult};
pub use local::{LocalConfig, LocalTransport, DEFAULT_LOCAL_PATH};
pub use pending::{PendingCall, PendingCalls};
pub use protocol::{InitializeParams, InitializeResult, ListToolsResult, McpTool, ToolCallResult, ToolContent};
pub use proxy::{ProxyConfig, ProxyTransport};
pub use remote::{RemoteConfig, RemoteTransport};
pub use token::{token_fn, FnTokenProvider, StaticToken, TokenProvider};
pub use transport::{ConnectionState, Transport, TransportKind};
