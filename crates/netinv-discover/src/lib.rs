//! netinv-discover: Subnet host discovery for the OPSI inventory.
//!
//! Sweeps configured subnets with the system `ping`, enriches reachable
//! hosts with reverse DNS and neighbor-table MAC addresses, writes a JSON
//! report, and optionally registers the hosts as OPSI clients.

pub mod enrich;
pub mod enumerate;
pub mod error;
pub mod probe;
pub mod run;
pub mod scheduler;
