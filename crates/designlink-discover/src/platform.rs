//! Platform configuration sources: settings files, the Windows registry and
//! macOS preferences.

use crate::error::DiscoverError;
use crate::result::DiscoveryMethod;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Upper bound for any OS command run during discovery.
pub(crate) const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Extract candidate ports from free-form configuration text.
///
/// Recognises `host:port` pairs and keys mentioning a port
/// (`"mcpPort": 3845`, `McpServerPort REG_DWORD 0xf05`, `port = 3845`).
/// Order of first appearance is kept and duplicates are dropped.
pub fn extract_ports(text: &str) -> Vec<u16> {
    static HOST_PORT: OnceLock<Regex> = OnceLock::new();
    static KEYED_PORT: OnceLock<Regex> = OnceLock::new();

    let host_port = HOST_PORT.get_or_init(|| {
        Regex::new(r"(?i)(?:localhost|127\.0\.0\.1|\[::1\]):(\d{2,5})").expect("valid regex")
    });
    let keyed_port = KEYED_PORT.get_or_init(|| {
        Regex::new(
            r#"(?i)port"?\s*(?:[:=]|REG_DWORD|REG_SZ)?\s*"?\s*(0x[0-9a-f]+|\d{2,5})\b"#,
        )
        .expect("valid regex")
    });

    let mut found: Vec<(usize, u16)> = Vec::new();
    for caps in host_port.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if let Some(port) = parse_port(m.as_str()) {
                found.push((m.start(), port));
            }
        }
    }
    for caps in keyed_port.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if let Some(port) = parse_port(m.as_str()) {
                found.push((m.start(), port));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut ports = Vec::new();
    for (_, port) in found {
        if !ports.contains(&port) {
            ports.push(port);
        }
    }
    ports
}

fn parse_port(raw: &str) -> Option<u16> {
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => raw.parse::<u32>().ok()?,
    };
    u16::try_from(value).ok().filter(|p| *p >= 1024)
}

/// Ports embedded in a settings file. Missing or unreadable files yield nothing.
pub async fn ports_from_settings_file(path: &Path) -> Vec<u16> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let ports = extract_ports(&text);
            debug!(path = %path.display(), ?ports, "Read settings file");
            ports
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Settings file unavailable");
            Vec::new()
        }
    }
}

/// Ports advertised by the OS-level configuration store on this platform,
/// tagged with the method that produced them.
pub async fn ports_from_platform_store() -> (DiscoveryMethod, Vec<u16>) {
    #[cfg(target_os = "windows")]
    {
        let ports = match run_command("reg", &["query", r"HKCU\Software\Figma", "/s"]).await {
            Ok(out) => extract_ports(&out),
            Err(e) => {
                debug!(error = %e, "Registry lookup failed");
                Vec::new()
            }
        };
        (DiscoveryMethod::Registry, ports)
    }

    #[cfg(target_os = "macos")]
    {
        let ports = match run_command("defaults", &["read", "com.figma.Desktop"]).await {
            Ok(out) => extract_ports(&out),
            Err(e) => {
                debug!(error = %e, "Preferences lookup failed");
                Vec::new()
            }
        };
        (DiscoveryMethod::Plist, ports)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        (DiscoveryMethod::Settings, Vec::new())
    }
}

/// Run a command with [`COMMAND_TIMEOUT`] and return its stdout.
pub(crate) async fn run_command(program: &str, args: &[&str]) -> Result<String, DiscoverError> {
    let fut = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(COMMAND_TIMEOUT, fut)
        .await
        .map_err(|_| DiscoverError::Command {
            command: program.to_string(),
            message: format!("timed out after {:?}", COMMAND_TIMEOUT),
        })?
        .map_err(|e| DiscoverError::Command {
            command: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(DiscoverError::Command {
            command: program.to_string(),
            message: format!("exited with {}", output.status),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
