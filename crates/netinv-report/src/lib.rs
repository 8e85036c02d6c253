//! Discovery report persistence.
//!
//! Every run writes a timestamped JSON report plus an always-current
//! `latest.json`, and prunes old reports beyond a retention count.

pub mod store;

pub use store::{FsReportStore, ReportError, ReportStore};
