//! Response body parsing for the streamable HTTP transport.
//!
//! A server may answer a POST either with a plain `application/json` body or
//! with a Server-Sent Events stream whose `data:` lines carry JSON-RPC
//! messages. Both are accepted regardless of the declared content type: a body
//! whose first non-whitespace character is `{` is read as JSON, anything else
//! is scanned as SSE for the message answering the outstanding request.

use crate::error::{McpError, McpResult};
use crate::protocol::JsonRpcResponse;
use tracing::{debug, warn};

/// Parse a response body into the JSON-RPC response for `expected_id`.
pub fn parse_response_body(body: &str, expected_id: u64) -> McpResult<JsonRpcResponse> {
    let trimmed = body.trim_start();

    if trimmed.starts_with('{') {
        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(response) => return Ok(response),
            Err(e) => {
                warn!(id = expected_id, error = %e, "Body looked like JSON but did not parse, scanning as SSE");
            }
        }
    }

    for data in sse_data_payloads(body) {
        match serde_json::from_str::<JsonRpcResponse>(&data) {
            Ok(response) if response.id == Some(expected_id) => return Ok(response),
            Ok(response) => {
                debug!(
                    expected = expected_id,
                    got = ?response.id,
                    "Skipping SSE message for another request"
                );
            }
            Err(e) => {
                debug!(error = %e, "Skipping non-response SSE payload");
            }
        }
    }

    Err(McpError::connection_fatal(format!(
        "No response for request {expected_id} in server reply"
    )))
}

/// Extract the `data` payload of every event in an SSE body.
///
/// Consecutive `data:` lines within one event are joined with `\n`; a blank
/// line terminates the event. Other fields (`event:`, `id:`, comments) are
/// ignored.
pub fn sse_data_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            if !current.is_empty() {
                payloads.push(current.join("\n"));
                current.clear();
            }
            continue;
        }

        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }

    if !current.is_empty() {
        payloads.push(current.join("\n"));
    }

    payloads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_and_json_parse_identically() {
        let sse = "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n";
        let json = r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#;

        let from_sse = parse_response_body(sse, 7).unwrap();
        let from_json = parse_response_body(json, 7).unwrap();

        assert_eq!(from_sse, from_json);
        assert_eq!(from_json.result, Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn test_json_with_leading_whitespace() {
        let body = "\n  {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{}}";
        let response = parse_response_body(body, 3).unwrap();
        assert_eq!(response.id, Some(3));
    }

    #[test]
    fn test_sse_picks_matching_id() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":4,\"result\":{\"n\":4}}\n\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":5,\"result\":{\"n\":5}}\n\n",
        );

        let response = parse_response_body(body, 5).unwrap();
        assert_eq!(response.result, Some(serde_json::json!({"n": 5})));
    }

    #[test]
    fn test_sse_without_space_and_crlf() {
        let body = "data:{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\r\n\r\n";
        assert!(parse_response_body(body, 1).is_ok());
    }

    #[test]
    fn test_multiline_data_joined() {
        let body = "data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":2,\"result\":{}}\n\n";
        let payloads = sse_data_payloads(body);
        assert_eq!(payloads.len(), 1);
        assert!(parse_response_body(body, 2).is_ok());
    }

    #[test]
    fn test_missing_response_is_connection_error() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":9,\"result\":{}}\n\n";
        let err = parse_response_body(body, 10).unwrap_err();
        assert!(matches!(err, McpError::Connection { retryable: false, .. }));
    }

    #[test]
    fn test_garbage_body() {
        assert!(parse_response_body("<html>oops</html>", 1).is_err());
        assert!(parse_response_body("", 1).is_err());
    }

    #[test]
    fn test_error_payload_is_returned_not_raised() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let response = parse_response_body(body, 1).unwrap();
        assert_eq!(response.error.unwrap().message, "Method not found");
    }
}
