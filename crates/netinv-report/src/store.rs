//! Report storage: the `ReportStore` trait and its filesystem implementation.
//!
//! Reports are stored as pretty-printed JSON files in a flat directory:
//! ```text
//! {root}/
//!   discovery-2026-10-14T08-30-00Z.json
//!   discovery-2026-10-15T08-30-00Z.json
//!   latest.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use netinv_core::DiscoveryReport;

const REPORT_PREFIX: &str = "discovery-";
const REPORT_SUFFIX: &str = ".json";
const LATEST_FILE: &str = "latest.json";

/// Errors that can occur while persisting reports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for report persistence backends.
pub trait ReportStore {
    /// Persist a report and refresh the latest pointer. Returns the path of
    /// the timestamped artifact.
    fn write(&self, report: &DiscoveryReport) -> Result<PathBuf, ReportError>;

    /// Read back the most recently written report.
    fn latest(&self) -> Result<DiscoveryReport, ReportError>;

    /// Timestamped report files, oldest first.
    fn history(&self) -> Result<Vec<PathBuf>, ReportError>;
}

/// Directory-backed report store with bounded history.
pub struct FsReportStore {
    root: PathBuf,
    max_history: i64,
}

impl FsReportStore {
    /// Create a store rooted at `root`. A `max_history` of zero or less
    /// keeps every report.
    pub fn new(root: impl Into<PathBuf>, max_history: i64) -> Self {
        Self {
            root: root.into(),
            max_history,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn report_path(&self, report: &DiscoveryReport) -> PathBuf {
        let stamp = report.generated_at.format("%Y-%m-%dT%H-%M-%S");
        self.root
            .join(format!("{REPORT_PREFIX}{stamp}Z{REPORT_SUFFIX}"))
    }

    /// Delete the oldest reports until at most `max_history` remain.
    fn prune(&self) -> Result<(), ReportError> {
        if self.max_history <= 0 {
            return Ok(());
        }

        let history = self.history()?;
        let keep = self.max_history as usize;
        if history.len() <= keep {
            return Ok(());
        }

        let excess = history.len() - keep;
        for stale in &history[..excess] {
            match fs::remove_file(stale) {
                Ok(()) => tracing::debug!(path = %stale.display(), "Pruned old report"),
                Err(e) => {
                    tracing::warn!(path = %stale.display(), error = %e, "Failed to remove old report")
                }
            }
        }

        Ok(())
    }
}

impl ReportStore for FsReportStore {
    fn write(&self, report: &DiscoveryReport) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.root)?;

        let json = serde_json::to_string_pretty(report)?;
        let path = self.report_path(report);
        fs::write(&path, &json)?;
        fs::write(self.root.join(LATEST_FILE), &json)?;

        tracing::debug!(
            path = %path.display(),
            results = report.results.len(),
            "Report saved"
        );

        self.prune()?;
        Ok(path)
    }

    fn latest(&self) -> Result<DiscoveryReport, ReportError> {
        let json = fs::read_to_string(self.root.join(LATEST_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn history(&self) -> Result<Vec<PathBuf>, ReportError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut reports: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if !is_report_file(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            reports.push((modified, path));
        }

        reports.sort();
        Ok(reports.into_iter().map(|(_, path)| path).collect())
    }
}

fn is_report_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(REPORT_PREFIX) && n.ends_with(REPORT_SUFFIX))
}
