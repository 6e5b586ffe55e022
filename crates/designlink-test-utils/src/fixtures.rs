//! Test fixtures: wire bodies and temporary configuration directories.

use designlink_mcp::{ToolCallResult, ToolContent};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A JSON-RPC success envelope.
pub fn rpc_result(id: u64, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// A JSON-RPC error envelope.
pub fn rpc_error(id: u64, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Frame JSON payloads as a Server-Sent-Events body.
pub fn sse_body(events: &[Value]) -> String {
    events
        .iter()
        .map(|e| format!("event: message\ndata: {e}\n\n"))
        .collect()
}

/// A typical `initialize` result.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {"tools": {}},
        "serverInfo": {"name": "Figma Dev Mode MCP Server", "version": "1.0.0"}
    })
}

/// A `tools/list` result with the given tool names.
pub fn tools_result(names: &[&str]) -> Value {
    json!({
        "tools": names
            .iter()
            .map(|n| json!({"name": n, "inputSchema": {"type": "object"}}))
            .collect::<Vec<_>>()
    })
}

/// A successful tool result with one text item.
pub fn text_result(text: &str) -> ToolCallResult {
    ToolCallResult {
        content: vec![ToolContent::Text {
            text: text.to_string(),
        }],
        is_error: false,
    }
}

/// A temporary directory for config files, removed on drop.
pub struct TestConfigDir {
    temp_dir: TempDir,
}

impl TestConfigDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `contents` to `name` inside the directory.
    pub fn with_file(self, name: impl AsRef<Path>, contents: impl AsRef<str>) -> Self {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents.as_ref()).expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

impl Default for TestConfigDir {
    fn default() -> Self {
        Self::new()
    }
}
