//! Error types for the netinv-discover crate.

use std::net::IpAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Ping binary '{binary}' not found in PATH")]
    PingNotFound { binary: String },

    #[error("Failed to execute ping for {ip}: {source}")]
    ProbeSpawn {
        ip: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("No subnets configured for discovery")]
    NoSubnets,

    #[error("Probe worker failed: {0}")]
    Worker(String),

    #[error("Discovery interrupted by user")]
    Interrupted,

    #[error("Report error: {0}")]
    Report(#[from] netinv_report::ReportError),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
