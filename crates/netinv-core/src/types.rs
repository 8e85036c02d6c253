//! Core domain types for a discovery run.
//!
//! A run produces one [`ProbeResult`] per probed address and wraps them in a
//! [`DiscoveryReport`] for persistence.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Probe Results ─────────────────────────────────────────────────

/// Outcome of probing a single address.
///
/// `latency_ms` is only ever set on reachable results and `error` only on
/// unreachable ones. Build values through [`ProbeResult::reachable`] and
/// [`ProbeResult::unreachable`] to keep it that way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub ip: IpAddr,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl ProbeResult {
    /// A host that answered, with its measured round-trip latency.
    pub fn reachable(ip: IpAddr, latency_ms: f64) -> Self {
        Self {
            ip,
            reachable: true,
            latency_ms: Some(latency_ms),
            error: None,
            hostname: None,
            mac: None,
        }
    }

    /// A host that did not answer. Empty error messages are dropped.
    pub fn unreachable(ip: IpAddr, error: Option<String>) -> Self {
        Self {
            ip,
            reachable: false,
            latency_ms: None,
            error: error.filter(|e| !e.is_empty()),
            hostname: None,
            mac: None,
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────

/// The persisted artifact of one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryReport {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ProbeResult>,
}

impl DiscoveryReport {
    pub fn new(results: Vec<ProbeResult>) -> Self {
        Self {
            generated_at: Utc::now(),
            results,
        }
    }

    /// Results for hosts that answered the probe.
    pub fn reachable(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.reachable)
    }
}
