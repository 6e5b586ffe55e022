//! Layered discovery.

use crate::config::{parse_port_list, DiscoveryConfig};
use crate::platform::{ports_from_platform_store, ports_from_settings_file};
use crate::result::{DiscoveryMethod, DiscoveryResult};
use crate::scan::scan_listening_ports;
use crate::verify::verify_port;
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Finds the local MCP endpoint.
///
/// Layers are tried in order and the first verified port wins:
/// override ports, platform configuration, then the process scan unioned
/// with the default ports. Nothing is cached between runs.
#[derive(Debug, Clone)]
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Discovery with platform defaults and the environment override.
    pub fn from_env() -> Self {
        Self::new(DiscoveryConfig::from_env())
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run every layer until a candidate verifies.
    pub async fn discover(&self) -> DiscoveryResult {
        let mut tried = 0usize;

        if let Some(raw) = &self.config.override_ports {
            let ports = parse_port_list(raw);
            if ports.is_empty() {
                warn!(value = %raw, "Override contains no usable ports");
            }
            let candidates: Vec<_> = ports.into_iter().map(|p| (p, DiscoveryMethod::Env)).collect();
            tried += candidates.len();
            if let Some(result) = self.first_verified(&candidates).await {
                return result;
            }
        }

        let candidates = self.platform_candidates().await;
        tried += candidates.len();
        if let Some(result) = self.first_verified(&candidates).await {
            return result;
        }

        let candidates = self.scan_candidates().await;
        tried += candidates.len();
        if let Some(result) = self.first_verified(&candidates).await {
            return result;
        }

        debug!(tried, "No local endpoint verified");
        DiscoveryResult::not_found(format!(
            "no verified MCP endpoint on {} among {tried} candidate port(s)",
            self.config.host
        ))
    }

    async fn platform_candidates(&self) -> Vec<(u16, DiscoveryMethod)> {
        let mut candidates = Vec::new();

        if self.config.query_platform {
            let (method, ports) = ports_from_platform_store().await;
            push_new(&mut candidates, ports, method);
        }

        for path in &self.config.settings_paths {
            let ports = ports_from_settings_file(path).await;
            push_new(&mut candidates, ports, DiscoveryMethod::Settings);
        }

        candidates
    }

    async fn scan_candidates(&self) -> Vec<(u16, DiscoveryMethod)> {
        let mut candidates = Vec::new();
        let scanned = scan_listening_ports(&self.config.process_names).await;
        push_new(&mut candidates, scanned, DiscoveryMethod::PortScan);
        push_new(
            &mut candidates,
            self.config.default_ports.clone(),
            DiscoveryMethod::Default,
        );
        candidates
    }

    /// Verify every candidate concurrently; the earliest listed success wins.
    async fn first_verified(
        &self,
        candidates: &[(u16, DiscoveryMethod)],
    ) -> Option<DiscoveryResult> {
        if candidates.is_empty() {
            return None;
        }

        let checks = candidates.iter().map(|(port, _)| {
            verify_port(
                &self.config.host,
                *port,
                &self.config.path,
                self.config.verify_timeout,
            )
        });
        let verdicts = join_all(checks).await;

        candidates
            .iter()
            .zip(verdicts)
            .find(|(_, ok)| *ok)
            .map(|((port, method), _)| {
                info!(port, method = %method, "Discovered local MCP endpoint");
                DiscoveryResult::found(*port, *method)
            })
    }
}

fn push_new(candidates: &mut Vec<(u16, DiscoveryMethod)>, ports: Vec<u16>, method: DiscoveryMethod) {
    for port in ports {
        if !candidates.iter().any(|(p, _)| *p == port) {
            candidates.push((port, method));
        }
    }
}
