//! OPSI inventory backend integration.
//!
//! Talks to the OPSI JSON-RPC API and registers discovered hosts as OPSI
//! clients. Registration is sequential and isolates failures per host.

pub mod client;
pub mod registration;
pub mod template;

pub use client::{OpsiApi, OpsiClient, RpcError};
pub use registration::{register_hosts, register_reachable, RegistrationSummary};
