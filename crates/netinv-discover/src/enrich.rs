//! Best-effort enrichment of reachable hosts: reverse DNS and MAC address.
//!
//! Every lookup here is allowed to fail; failure leaves the field empty and
//! is never reported upward.

use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use netinv_core::config::DiscoveryConfig;
use netinv_core::ProbeResult;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

/// `lladdr` token in `ip neigh show` output.
static LLADDR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)lladdr\s+((?:[0-9a-f]{2}:){5}[0-9a-f]{2})").unwrap());

/// Any colon-separated MAC, as printed by `arp -n`.
static MAC_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b((?:[0-9a-f]{2}:){5}[0-9a-f]{2})\b").unwrap());

/// Reverse name resolution.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn hostname(&self, ip: IpAddr) -> Option<String>;
}

/// Neighbor-table (ARP/NDP) MAC resolution.
#[async_trait]
pub trait NeighborResolver: Send + Sync {
    async fn mac(&self, ip: IpAddr) -> Option<String>;
}

/// Reverse DNS through the system resolver.
pub struct SystemResolver;

#[async_trait]
impl HostnameResolver for SystemResolver {
    async fn hostname(&self, ip: IpAddr) -> Option<String> {
        // getnameinfo blocks; keep it off the runtime workers.
        match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await {
            Ok(Ok(name)) => clean_hostname(&name, ip),
            Ok(Err(e)) => {
                tracing::debug!(ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Reverse lookup task failed");
                None
            }
        }
    }
}

/// MAC lookup via `ip neigh`, falling back to `arp -n`.
pub struct NeighborTable;

#[async_trait]
impl NeighborResolver for NeighborTable {
    async fn mac(&self, ip: IpAddr) -> Option<String> {
        let target = ip.to_string();

        if let Some(mac) = run_tool("ip", &["neigh", "show", &target])
            .await
            .and_then(|out| parse_ip_neigh(&out))
        {
            return Some(mac);
        }

        run_tool("arp", &["-n", &target])
            .await
            .and_then(|out| parse_arp(&out))
    }
}

/// Run a lookup tool and return its stdout when it exits successfully.
async fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(program, error = %e, "Neighbor lookup tool unavailable");
            None
        }
    }
}

/// Strip the trailing root dot; discard empty names and address echoes.
pub fn clean_hostname(name: &str, ip: IpAddr) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name == ip.to_string() {
        return None;
    }
    Some(name.to_string())
}

pub fn parse_ip_neigh(stdout: &str) -> Option<String> {
    LLADDR_REGEX
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

pub fn parse_arp(stdout: &str) -> Option<String> {
    MAC_REGEX
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Attaches hostname and MAC to reachable probe results.
#[derive(Clone)]
pub struct HostEnricher {
    dns_lookup: bool,
    capture_mac: bool,
    hostnames: Arc<dyn HostnameResolver>,
    neighbors: Arc<dyn NeighborResolver>,
}

impl HostEnricher {
    pub fn new(
        config: &DiscoveryConfig,
        hostnames: Arc<dyn HostnameResolver>,
        neighbors: Arc<dyn NeighborResolver>,
    ) -> Self {
        Self {
            dns_lookup: config.dns_lookup,
            capture_mac: config.capture_mac,
            hostnames,
            neighbors,
        }
    }

    /// Enricher backed by the system resolver and neighbor table.
    pub fn system(config: &DiscoveryConfig) -> Self {
        Self::new(config, Arc::new(SystemResolver), Arc::new(NeighborTable))
    }

    /// Fill in enabled lookups for a reachable result; unreachable results
    /// are left untouched.
    pub async fn enrich(&self, result: &mut ProbeResult) {
        if !result.reachable {
            return;
        }
        if self.dns_lookup {
            result.hostname = self.hostnames.hostname(result.ip).await;
        }
        if self.capture_mac {
            result.mac = self.neighbors.mac(result.ip).await;
        }
    }
}
