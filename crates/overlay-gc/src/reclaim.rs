//! Orphan detection and deletion.
//!
//! A reclaim pass compares the layer directories present under the storage
//! root with a [`LivenessSet`] snapshot and deletes the directories nobody
//! references. The pass is strictly sequential:
//!
//! 1. The liveness snapshot is taken (before anything is enumerated).
//! 2. The storage root's immediate subdirectories are listed.
//! 3. Each directory absent from the snapshot is measured, then deleted.
//! 4. If anything was deleted, the audit log is rewritten. Failing to write
//!    it does not undo or fail the pass; the report carries the error.
//!
//! A directory whose identifier is in the snapshot is never touched. A
//! candidate that cannot be measured is skipped rather than deleted, and a
//! failed deletion is logged and the pass moves on. Only a failure to obtain
//! the snapshot at all stops a pass, and in that case nothing is deleted.
//!
//! # Example
//!
//! ```no_run
//! use overlay_gc::{LivenessSet, OverlayRoot, Reclaimer};
//!
//! let root = OverlayRoot::open("/var/lib/docker/overlay2")?;
//! let live: LivenessSet = ["3f2a", "3f2a-init"].into_iter().collect();
//! let report = Reclaimer::new(&root, vec!["l".to_string()]).reclaim(&live)?;
//! println!("reclaimed {} bytes", report.reclaimed_bytes());
//! # Ok::<(), overlay_gc::ReclaimError>(())
//! ```

use std::fmt;
use std::io;

use serde::Serialize;

use crate::audit::write_audit_log;
use crate::config::ReclaimConfig;
use crate::error::Result;
use crate::layer_fs::LayerFs;
use crate::oracle::{LivenessOracle, LivenessSet};
use crate::units::human_size;

/// Why a candidate was left in place without attempting deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "details", rename_all = "kebab-case")]
pub enum SkipReason {
    /// Part of the tree could not be read.
    PermissionDenied,
    /// Measuring failed for another reason.
    Unmeasurable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PermissionDenied => write!(f, "permission denied"),
            SkipReason::Unmeasurable(e) => write!(f, "size unavailable: {}", e),
        }
    }
}

/// What happened to one orphan candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "details", rename_all = "kebab-case")]
pub enum Outcome {
    /// The directory was removed.
    Deleted,
    /// The directory would be removed; nothing was changed (dry run).
    Planned,
    /// Left in place because it could not be measured.
    Skipped(SkipReason),
    /// Removal was attempted and failed.
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Planned => write!(f, "would delete"),
            Outcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            Outcome::Failed(cause) => write!(f, "failed: {}", cause),
        }
    }
}

/// One orphan candidate and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionRecord {
    /// Layer identifier (directory name).
    pub identifier: String,
    /// Size measured just before deletion, if measuring succeeded.
    pub size: Option<u64>,
    /// Result of processing the candidate.
    pub outcome: Outcome,
}

impl DeletionRecord {
    /// The audit log line for this record: `<identifier> (<size>)`.
    pub fn audit_line(&self) -> String {
        format!("{} ({})", self.identifier, human_size(self.size.unwrap_or(0)))
    }
}

/// Summary of a reclaim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Directories found under the storage root.
    pub scanned: usize,
    /// Directories kept because they are referenced.
    pub retained: usize,
    /// Directories kept because their name is protected.
    pub protected: usize,
    /// One record per orphan candidate, in enumeration order.
    pub records: Vec<DeletionRecord>,
    /// Set when directories were deleted but the audit log could not be
    /// written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

impl ReclaimReport {
    /// Records of directories that were removed.
    pub fn deleted(&self) -> impl Iterator<Item = &DeletionRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::Deleted)
    }

    /// Records of candidates skipped without a deletion attempt.
    pub fn skipped(&self) -> impl Iterator<Item = &DeletionRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skipped(_)))
    }

    /// Records of candidates whose deletion failed.
    pub fn failed(&self) -> impl Iterator<Item = &DeletionRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    /// Bytes freed by successful deletions, as measured before deletion.
    pub fn reclaimed_bytes(&self) -> u64 {
        self.deleted().filter_map(|r| r.size).sum()
    }

    /// Bytes a dry run would free.
    pub fn planned_bytes(&self) -> u64 {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::Planned)
            .filter_map(|r| r.size)
            .sum()
    }
}

/// Deletes unreferenced layer directories.
#[derive(Debug)]
pub struct Reclaimer<'a, F: LayerFs> {
    fs: &'a F,
    protected: Vec<String>,
}

impl<'a, F: LayerFs> Reclaimer<'a, F> {
    /// Create a reclaimer over `fs`. Directories named in `protected` are
    /// never candidates.
    pub fn new(fs: &'a F, protected: Vec<String>) -> Self {
        Self { fs, protected }
    }

    /// Delete every directory not referenced by `live`.
    ///
    /// Only listing the storage root can fail the pass; per-directory
    /// problems are recorded in the report.
    pub fn reclaim(&self, live: &LivenessSet) -> Result<ReclaimReport> {
        self.process(live, false)
    }

    /// Measure the orphan candidates without deleting anything.
    pub fn plan(&self, live: &LivenessSet) -> Result<ReclaimReport> {
        self.process(live, true)
    }

    fn process(&self, live: &LivenessSet, dry_run: bool) -> Result<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for id in self.fs.list()? {
            report.scanned += 1;

            if self.protected.iter().any(|p| *p == id) {
                report.protected += 1;
                continue;
            }
            if live.contains(&id) {
                tracing::trace!(layer = %id, "referenced, keeping");
                report.retained += 1;
                continue;
            }

            report.records.push(self.process_candidate(id, dry_run));
        }

        tracing::debug!(
            scanned = report.scanned,
            retained = report.retained,
            candidates = report.records.len(),
            "scan complete"
        );
        Ok(report)
    }

    fn process_candidate(&self, identifier: String, dry_run: bool) -> DeletionRecord {
        let size = match self.fs.measure(&identifier) {
            Ok(size) => size,
            Err(e) => {
                let reason = classify_measure_error(&e);
                tracing::warn!(layer = %identifier, error = %e, "skipped: {}", reason);
                return DeletionRecord {
                    identifier,
                    size: None,
                    outcome: Outcome::Skipped(reason),
                };
            }
        };

        if dry_run {
            tracing::info!(layer = %identifier, size = %human_size(size), "orphaned");
            return DeletionRecord {
                identifier,
                size: Some(size),
                outcome: Outcome::Planned,
            };
        }

        tracing::info!(layer = %identifier, size = %human_size(size), "orphaned, deleting");
        let outcome = match self.fs.remove(&identifier) {
            Ok(()) => Outcome::Deleted,
            Err(e) => {
                tracing::error!(layer = %identifier, error = %e, "failed to delete");
                Outcome::Failed(e.to_string())
            }
        };

        DeletionRecord {
            identifier,
            size: Some(size),
            outcome,
        }
    }
}

fn classify_measure_error(e: &io::Error) -> SkipReason {
    if e.kind() == io::ErrorKind::PermissionDenied {
        SkipReason::PermissionDenied
    } else {
        SkipReason::Unmeasurable(e.to_string())
    }
}

/// Run a complete pass: query the oracle, reclaim, write the audit log.
///
/// The oracle is consulted before the storage root is listed. If it fails,
/// the error is returned and the filesystem is not touched. In a dry run
/// nothing is deleted and the audit log is left alone.
pub fn run_pass<O, F>(
    oracle: &O,
    fs: &F,
    config: &ReclaimConfig,
    dry_run: bool,
) -> Result<ReclaimReport>
where
    O: LivenessOracle + ?Sized,
    F: LayerFs,
{
    let live = oracle.query_live_identifiers()?;
    let reclaimer = Reclaimer::new(fs, config.protected.clone());

    if dry_run {
        return reclaimer.plan(&live);
    }

    let mut report = reclaimer.reclaim(&live)?;
    let deleted: Vec<&DeletionRecord> = report.deleted().collect();
    if deleted.is_empty() {
        tracing::info!("no orphaned directories deleted");
        return Ok(report);
    }

    tracing::info!(
        deleted = deleted.len(),
        reclaimed = %human_size(report.reclaimed_bytes()),
        "deleted orphaned directories"
    );
    match write_audit_log(&config.audit_log, &deleted) {
        Ok(()) => {
            tracing::info!(audit_log = %config.audit_log.display(), "audit log written");
        }
        Err(e) => {
            for record in &deleted {
                tracing::error!(layer = %record.identifier, "deleted but not recorded in audit log");
            }
            tracing::error!(error = %e, "failed to write audit log");
            report.audit_error = Some(e.to_string());
        }
    }

    Ok(report)
}
