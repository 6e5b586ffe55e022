//! Candidate verification.
//!
//! A port is accepted only when something speaking HTTP answers on it. Two
//! strategies race and the first success wins:
//!
//! - an upgrade handshake over a raw TCP stream, accepted on `101`
//! - a plain `GET` against the expected path, accepted on any status but `404`
//!
//! Both are bounded by the configured verification timeout.

use futures::future::{select_ok, BoxFuture, FutureExt};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Why a single strategy rejected a candidate.
#[derive(Debug)]
enum Rejection {
    Io(std::io::Error),
    Http(String),
    Status(u16),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Io(e) => write!(f, "io: {e}"),
            Rejection::Http(e) => write!(f, "http: {e}"),
            Rejection::Status(code) => write!(f, "status {code}"),
        }
    }
}

/// Verify that `host:port` serves the MCP endpoint at `path`.
pub async fn verify_port(host: &str, port: u16, path: &str, timeout: Duration) -> bool {
    let attempts: Vec<BoxFuture<'_, Result<&'static str, Rejection>>> = vec![
        upgrade_handshake(host, port, path).boxed(),
        http_probe(host, port, path, timeout).boxed(),
    ];

    match tokio::time::timeout(timeout, select_ok(attempts)).await {
        Ok(Ok((strategy, _))) => {
            debug!(port, strategy, "Verified candidate");
            true
        }
        Ok(Err(e)) => {
            debug!(port, reason = %e, "Candidate rejected");
            false
        }
        Err(_) => {
            debug!(port, ?timeout, "Candidate verification timed out");
            false
        }
    }
}

async fn upgrade_handshake(host: &str, port: u16, path: &str) -> Result<&'static str, Rejection> {
    let mut stream = TcpStream::connect((host, port)).await.map_err(Rejection::Io)?;

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: ZGVzaWdubGluay1wcm9iZQ==\r\n\
         \r\n"
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(Rejection::Io)?;

    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).await.map_err(Rejection::Io)?;
    let head = String::from_utf8_lossy(&buf[..n]);

    match status_code(&head) {
        Some(101) => Ok("upgrade"),
        Some(code) => Err(Rejection::Status(code)),
        None => Err(Rejection::Http("not an HTTP response".to_string())),
    }
}

async fn http_probe(
    host: &str,
    port: u16,
    path: &str,
    timeout: Duration,
) -> Result<&'static str, Rejection> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Rejection::Http(e.to_string()))?;

    let response = client
        .get(format!("http://{host}:{port}{path}"))
        .header("Accept", "application/json, text/event-stream")
        .send()
        .await
        .map_err(|e| Rejection::Http(e.to_string()))?;

    match response.status().as_u16() {
        404 => Err(Rejection::Status(404)),
        _ => Ok("probe"),
    }
}

fn status_code(head: &str) -> Option<u16> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
