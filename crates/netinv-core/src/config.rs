//! Configuration for netinv discovery runs.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`NETINV__` prefix, `__` between sections)
//! 2. Config file (`configs/inventory/auto-inventory.yml` by default)
//! 3. Defaults
//!
//! Every section and field has a default, so a file only needs to name what
//! it overrides.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{InventoryError, Result};

/// Config file used when no `--config` override is given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/inventory/auto-inventory.yml";

/// Top-level inventory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Master switch; a disabled config only runs with `--force`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// CIDR networks to sweep.
    #[serde(default = "default_subnets")]
    pub subnets: Vec<String>,

    /// Addresses never probed, even when inside a configured subnet.
    #[serde(default = "default_exclude_addresses")]
    pub exclude_addresses: Vec<String>,

    #[serde(default)]
    pub ping: PingConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub opsi: OpsiConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// External ping invocation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PingConfig {
    /// Binary name (looked up on `PATH`) or path.
    #[serde(default = "default_ping_binary")]
    pub binary: String,

    /// Echo requests per host.
    #[serde(default = "default_ping_count")]
    pub count: u32,

    /// Per-host reply timeout; rounded up to whole seconds.
    #[serde(default = "default_ping_timeout_ms")]
    pub timeout_ms: u64,

    /// Worker pool size; derived from the CPU count when unset.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Passed through to ping verbatim, before the address.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl PingConfig {
    /// Echo request count, never below one.
    pub fn effective_count(&self) -> u32 {
        self.count.max(1)
    }

    /// Reply timeout in whole seconds, rounded up, never below one.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_ms.max(1).div_ceil(1000).max(1)
    }
}

/// Enrichment toggles for reachable hosts.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub dns_lookup: bool,

    #[serde(default = "default_true")]
    pub capture_mac: bool,
}

/// Connection settings for the OPSI JSON-RPC API.
#[derive(Debug, Clone, Deserialize)]
pub struct OpsiConfig {
    #[serde(default = "default_api_url")]
    pub api_url: Option<String>,

    #[serde(default = "default_username")]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// PEM bundle trusted in addition to the system roots.
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// How discovered hosts are registered as OPSI clients.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default)]
    pub auto_register: bool,

    /// Rendered with `{hostname}`, `{domain}` and `{ip}`.
    #[serde(default = "default_client_id_template")]
    pub client_id_template: String,

    #[serde(default = "default_fallback_domain")]
    pub fallback_domain: String,

    /// Host group new clients are added to; empty disables.
    #[serde(default = "default_group")]
    pub default_group: String,

    /// Rendered against the probe result fields.
    #[serde(default = "default_notes")]
    pub notes: String,

    #[serde(default)]
    pub inventory_number: String,

    /// Queue an `auditHardware` action for every new client.
    #[serde(default = "default_true")]
    pub trigger_hwscan: bool,
}

/// Report persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Report files kept on disk; zero or negative keeps everything.
    #[serde(default = "default_max_history")]
    pub max_history: i64,

    /// Sort results by address instead of keeping completion order.
    #[serde(default)]
    pub sort_by_address: bool,
}

fn default_true() -> bool {
    true
}

fn default_subnets() -> Vec<String> {
    vec!["192.168.1.0/24".to_string()]
}

fn default_exclude_addresses() -> Vec<String> {
    vec!["192.168.1.1".to_string()]
}

fn default_ping_binary() -> String {
    "ping".to_string()
}

fn default_ping_count() -> u32 {
    1
}

fn default_ping_timeout_ms() -> u64 {
    750
}

fn default_api_url() -> Option<String> {
    Some("https://opsi.local:4447/rpc".to_string())
}

fn default_username() -> Option<String> {
    Some("opsiadmin".to_string())
}

fn default_request_timeout() -> u64 {
    10
}

fn default_client_id_template() -> String {
    "{hostname}.{domain}".to_string()
}

fn default_fallback_domain() -> String {
    "opsi.local".to_string()
}

fn default_group() -> String {
    "inventory-auto".to_string()
}

fn default_notes() -> String {
    "Discovered via automated inventory scan".to_string()
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("data/inventory")
}

fn default_max_history() -> i64 {
    30
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subnets: default_subnets(),
            exclude_addresses: default_exclude_addresses(),
            ping: PingConfig::default(),
            discovery: DiscoveryConfig::default(),
            opsi: OpsiConfig::default(),
            registration: RegistrationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            binary: default_ping_binary(),
            count: default_ping_count(),
            timeout_ms: default_ping_timeout_ms(),
            workers: None,
            extra_args: Vec::new(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dns_lookup: true,
            capture_mac: true,
        }
    }
}

impl Default for OpsiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            username: default_username(),
            password: None,
            verify_ssl: true,
            ca_bundle: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            auto_register: false,
            client_id_template: default_client_id_template(),
            fallback_domain: default_fallback_domain(),
            default_group: default_group(),
            notes: default_notes(),
            inventory_number: String::new(),
            trigger_hwscan: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            max_history: default_max_history(),
            sort_by_address: false,
        }
    }
}

impl InventoryConfig {
    /// Load configuration from `path`, layered under `NETINV__` environment
    /// overrides.
    ///
    /// A missing or empty file yields the defaults. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = if path.exists() {
            std::fs::read_to_string(path).map_err(|e| {
                InventoryError::Config(format!(
                    "failed to read configuration file {}: {e}",
                    path.display()
                ))
            })?
        } else {
            tracing::warn!(path = %path.display(), "Configuration file not found; using defaults");
            String::new()
        };

        if path.exists() && text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "Configuration file is empty; using defaults");
        }

        Self::from_sources(&text, file_format(path))
    }

    /// Build a configuration from raw file text plus environment overrides.
    pub fn from_sources(text: &str, format: FileFormat) -> Result<Self> {
        let mut builder = Config::builder();
        if !text.trim().is_empty() {
            builder = builder.add_source(File::from_str(text, format));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("NETINV")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: InventoryConfig = cfg.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        if self.ping.binary.trim().is_empty() {
            return Err(InventoryError::Config(
                "ping.binary must not be empty".to_string(),
            ));
        }
        if self.registration.client_id_template.trim().is_empty() {
            return Err(InventoryError::Config(
                "registration.client_id_template must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// JSON and TOML by extension; everything else is read as YAML, which also
/// accepts plain JSON.
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    }
}
