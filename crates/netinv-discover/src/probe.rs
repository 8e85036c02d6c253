//! Reachability probing via the system ping binary.
//!
//! Ping runs as a child process via `tokio::process::Command` so a slow host
//! never blocks the runtime. The ping's own `-W` timeout bounds each probe.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use netinv_core::config::PingConfig;
use netinv_core::ProbeResult;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::error::{DiscoverError, Result};

/// Round-trip time as printed by iputils, busybox and BSD ping.
static LATENCY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time[=<]([0-9.]+)\s*ms").unwrap());

/// A reachability check for a single address.
///
/// Implementations report unreachable hosts as an `Ok` result; an `Err`
/// means the probe itself could not run and aborts the whole sweep.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, ip: IpAddr) -> Result<ProbeResult>;
}

/// A validated ping invocation, minus the target address.
#[derive(Debug, Clone)]
pub struct PingCommand {
    binary: PathBuf,
    args: Vec<String>,
}

impl PingCommand {
    /// Resolve the configured binary on `PATH` and build the argument list.
    pub fn resolve(config: &PingConfig) -> Result<Self> {
        let binary = which::which(&config.binary).map_err(|_| DiscoverError::PingNotFound {
            binary: config.binary.clone(),
        })?;
        Ok(Self::with_binary(binary, config))
    }

    /// Build the command for an already-located binary.
    pub fn with_binary(binary: impl Into<PathBuf>, config: &PingConfig) -> Self {
        let mut args = vec![
            "-n".to_string(),
            "-c".to_string(),
            config.effective_count().to_string(),
            "-W".to_string(),
            config.timeout_secs().to_string(),
        ];
        args.extend(config.extra_args.iter().cloned());
        Self {
            binary: binary.into(),
            args,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Full argument list for probing `ip`.
    pub fn args_for(&self, ip: IpAddr) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(ip.to_string());
        args
    }
}

/// [`Prober`] backed by the system ping binary.
pub struct PingProber {
    command: PingCommand,
}

impl PingProber {
    pub fn new(command: PingCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, ip: IpAddr) -> Result<ProbeResult> {
        let start = Instant::now();

        let output = Command::new(self.command.binary())
            .args(self.command.args_for(ip))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DiscoverError::ProbeSpawn { ip, source })?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let result = classify(ip, output.status.success(), &stdout, &stderr, elapsed_ms);
        tracing::debug!(
            ip = %ip,
            reachable = result.reachable,
            code = output.status.code().unwrap_or(-1),
            "Probe finished"
        );
        Ok(result)
    }
}

/// Extract the first reported round-trip time from ping output.
pub fn parse_latency(stdout: &str) -> Option<f64> {
    LATENCY_REGEX
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Turn a finished ping invocation into a result.
///
/// Exit status alone decides reachability. Reachable hosts without a parsable
/// `time=` fall back to the wall-clock duration of the invocation.
pub fn classify(
    ip: IpAddr,
    success: bool,
    stdout: &str,
    stderr: &str,
    elapsed_ms: f64,
) -> ProbeResult {
    if success {
        let latency = parse_latency(stdout).unwrap_or_else(|| round2(elapsed_ms));
        return ProbeResult::reachable(ip, latency);
    }

    let message = match stderr.trim() {
        "" => stdout.trim(),
        err => err,
    };
    ProbeResult::unreachable(ip, Some(message.to_string()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
