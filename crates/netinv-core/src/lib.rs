//! netinv-core: Shared types, configuration, and error handling for netinv.
//!
//! This crate provides the foundational pieces used by every netinv crate:
//! - Probe results and discovery reports
//! - The typed inventory configuration and its loader
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::InventoryConfig;
pub use crate::error::InventoryError;
pub use crate::types::{DiscoveryReport, ProbeResult};
