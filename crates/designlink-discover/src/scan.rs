//! Listening-socket scan for processes belonging to the target application.

use crate::platform::run_command;
use std::collections::HashSet;
use tracing::debug;

/// A listening TCP socket and the process that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListeningSocket {
    pub pid: u32,
    pub process: String,
    pub port: u16,
}

/// Ports listened on by processes whose name contains one of `names`
/// (case-insensitive). Probe failures yield an empty list.
pub async fn scan_listening_ports(names: &[String]) -> Vec<u16> {
    if names.is_empty() {
        return Vec::new();
    }

    let sockets = match list_listening_sockets().await {
        Ok(sockets) => sockets,
        Err(e) => {
            debug!(error = %e, "Listening socket scan failed");
            return Vec::new();
        }
    };

    let ports = matching_ports(&sockets, names);
    debug!(?ports, "Process scan candidates");
    ports
}

fn matching_ports(sockets: &[ListeningSocket], names: &[String]) -> Vec<u16> {
    let needles: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let mut ports = Vec::new();
    for socket in sockets {
        let process = socket.process.to_lowercase();
        if needles.iter().any(|n| process.contains(n.as_str())) && !ports.contains(&socket.port) {
            ports.push(socket.port);
        }
    }
    ports
}

#[cfg(unix)]
async fn list_listening_sockets() -> Result<Vec<ListeningSocket>, crate::DiscoverError> {
    let out = run_command("lsof", &["-iTCP", "-sTCP:LISTEN", "-n", "-P"]).await?;
    Ok(parse_lsof(&out))
}

#[cfg(windows)]
async fn list_listening_sockets() -> Result<Vec<ListeningSocket>, crate::DiscoverError> {
    let netstat = run_command("netstat", &["-ano", "-p", "TCP"]).await?;
    let tasklist = run_command("tasklist", &["/FO", "CSV", "/NH"]).await?;
    let names = parse_tasklist(&tasklist);

    Ok(parse_netstat(&netstat)
        .into_iter()
        .filter_map(|(pid, port)| {
            names.get(&pid).map(|process| ListeningSocket {
                pid,
                process: process.clone(),
                port,
            })
        })
        .collect())
}

/// Parse `lsof -iTCP -sTCP:LISTEN -n -P` output.
pub fn parse_lsof(output: &str) -> Vec<ListeningSocket> {
    let mut seen = HashSet::new();
    let mut sockets = Vec::new();

    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 9 || !line.contains("(LISTEN)") {
            continue;
        }
        let Ok(pid) = fields[1].parse::<u32>() else {
            continue;
        };
        // NAME is the second to last column, before "(LISTEN)".
        let name = fields[fields.len() - 2];
        let Some(port) = port_of(name) else {
            continue;
        };
        if seen.insert((pid, port)) {
            sockets.push(ListeningSocket {
                pid,
                process: fields[0].replace("\\x20", " "),
                port,
            });
        }
    }

    sockets
}

/// Parse `netstat -ano` output into `(pid, port)` pairs for listening sockets.
pub fn parse_netstat(output: &str) -> Vec<(u32, u16)> {
    let mut pairs = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || !fields[0].eq_ignore_ascii_case("TCP") {
            continue;
        }
        if !fields[3].eq_ignore_ascii_case("LISTENING") {
            continue;
        }
        let (Some(port), Ok(pid)) = (port_of(fields[1]), fields[4].parse::<u32>()) else {
            continue;
        };
        if !pairs.contains(&(pid, port)) {
            pairs.push((pid, port));
        }
    }
    pairs
}

/// Parse `tasklist /FO CSV /NH` output into a pid → image name map.
pub fn parse_tasklist(output: &str) -> std::collections::HashMap<u32, String> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split("\",\"").map(|c| c.trim_matches('"'));
            let image = cols.next()?.trim();
            let pid = cols.next()?.trim().parse::<u32>().ok()?;
            Some((pid, image.to_string()))
        })
        .collect()
}

fn port_of(address: &str) -> Option<u16> {
    address.rsplit_once(':')?.1.parse::<u16>().ok()
}
