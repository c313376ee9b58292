use std::collections::btree_map;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use super::hasher::ContentHasher;
use super::manifest::{resolve_under, Manifest, ManifestEntry, ModifiedTime};
use crate::core::cancel::CancelFlag;
use crate::core::error::LauncherError;

/// Emitted after every manifest entry that passed, whichever path it took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyProgress {
    pub checked: usize,
    pub total: usize,
    pub current_path: Option<String>,
    /// `true` when the entry needed a full content hash.
    pub hashed: bool,
}

impl VerifyProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.checked as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pass,
    Fail,
}

/// Why a verification run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifyFailure {
    Missing { path: String },
    Corrupt { path: String },
    Unreadable { path: String, detail: String },
    Cancelled,
}

impl VerifyFailure {
    pub fn path(&self) -> Option<&str> {
        match self {
            VerifyFailure::Missing { path }
            | VerifyFailure::Corrupt { path }
            | VerifyFailure::Unreadable { path, .. } => Some(path),
            VerifyFailure::Cancelled => None,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            VerifyFailure::Missing { path } => format!("missing: {path}"),
            VerifyFailure::Corrupt { path } => format!("corrupt or modified: {path}"),
            VerifyFailure::Unreadable { path, detail } => format!("unreadable: {path} ({detail})"),
            VerifyFailure::Cancelled => "cancelled".into(),
        }
    }
}

impl From<VerifyFailure> for LauncherError {
    fn from(failure: VerifyFailure) -> Self {
        match failure {
            VerifyFailure::Missing { path } => LauncherError::FileMissing(path),
            VerifyFailure::Corrupt { path } => LauncherError::FileCorrupt(path),
            VerifyFailure::Unreadable { path, detail } => {
                LauncherError::FileUnreadable { path, detail }
            }
            VerifyFailure::Cancelled => LauncherError::Cancelled,
        }
    }
}

/// Terminal result of one verification run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub failure: Option<VerifyFailure>,
    pub files_checked: usize,
    pub files_hashed: usize,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.status == VerificationStatus::Pass
    }

    pub fn failing_path(&self) -> Option<&str> {
        self.failure.as_ref().and_then(VerifyFailure::path)
    }

    pub fn reason(&self) -> Option<String> {
        self.failure.as_ref().map(VerifyFailure::reason)
    }

    /// Collapse into the crate error type for callers that only care about pass/fail.
    pub fn into_result(self) -> Result<(), LauncherError> {
        match self.failure {
            None => Ok(()),
            Some(failure) => Err(failure.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VerifyEvent {
    Progress(VerifyProgress),
    Finished(VerificationReport),
}

/// Lazy verification of a manifest against a data root.
///
/// Yields a `Progress` event per passing entry and exactly one `Finished`
/// event, after which it is exhausted. Entries are checked strictly in
/// manifest order and the first failure ends the run.
pub struct Verification<'a, H: ContentHasher + ?Sized> {
    entries: btree_map::Values<'a, String, ManifestEntry>,
    data_root: PathBuf,
    hasher: &'a H,
    cancel: Option<CancelFlag>,
    total: usize,
    checked: usize,
    hashed: usize,
    empty_progress_sent: bool,
    /// Set once the run has ended; later steps keep returning it.
    report: Option<VerificationReport>,
    report_emitted: bool,
}

/// Start verifying `manifest` against the files under `data_root`.
pub fn verify<'a, H: ContentHasher + ?Sized>(
    manifest: &'a Manifest,
    data_root: &Path,
    hasher: &'a H,
) -> Verification<'a, H> {
    Verification {
        entries: manifest.entries(),
        data_root: data_root.to_path_buf(),
        hasher,
        cancel: None,
        total: manifest.len(),
        checked: 0,
        hashed: 0,
        empty_progress_sent: false,
        report: None,
        report_emitted: false,
    }
}

impl<'a, H: ContentHasher + ?Sized> Verification<'a, H> {
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Drive the run to completion, handing each progress event to `on_progress`.
    ///
    /// On a run that already finished this returns the same report again.
    pub fn run<F: FnMut(&VerifyProgress)>(mut self, mut on_progress: F) -> VerificationReport {
        loop {
            match self.step() {
                Ok(progress) => on_progress(&progress),
                Err(report) => return report,
            }
        }
    }

    /// Check the next entry. `Err` carries the final report once the run is over.
    fn step(&mut self) -> Result<VerifyProgress, VerificationReport> {
        if let Some(report) = &self.report {
            return Err(report.clone());
        }

        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(self.finish(Some(VerifyFailure::Cancelled)));
        }

        if self.total == 0 && !self.empty_progress_sent {
            self.empty_progress_sent = true;
            return Ok(VerifyProgress {
                checked: 0,
                total: 0,
                current_path: None,
                hashed: false,
            });
        }

        let Some(entry) = self.entries.next() else {
            return Err(self.finish(None));
        };

        match self.check_entry(entry) {
            Ok(hashed) => {
                self.checked += 1;
                if hashed {
                    self.hashed += 1;
                }
                Ok(VerifyProgress {
                    checked: self.checked,
                    total: self.total,
                    current_path: Some(entry.relative_path.clone()),
                    hashed,
                })
            }
            Err(failure) => Err(self.finish(Some(failure))),
        }
    }

    fn finish(&mut self, failure: Option<VerifyFailure>) -> VerificationReport {
        let status = match &failure {
            None => {
                info!(
                    "Verification passed: {} files ({} hashed)",
                    self.checked, self.hashed
                );
                VerificationStatus::Pass
            }
            Some(failure) => {
                error!("Verification failed: {}", failure.reason());
                VerificationStatus::Fail
            }
        };
        let report = VerificationReport {
            status,
            failure,
            files_checked: self.checked,
            files_hashed: self.hashed,
        };
        self.report = Some(report.clone());
        report
    }

    /// Returns whether the entry needed hashing.
    fn check_entry(&self, entry: &ManifestEntry) -> Result<bool, VerifyFailure> {
        let rel = &entry.relative_path;
        let path = resolve_under(&self.data_root, rel);

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VerifyFailure::Missing { path: rel.clone() })
            }
            Err(e) => {
                return Err(VerifyFailure::Unreadable {
                    path: rel.clone(),
                    detail: e.to_string(),
                })
            }
        };

        // Directories and symlinks at a listed path count as missing files.
        if !metadata.file_type().is_file() {
            return Err(VerifyFailure::Missing { path: rel.clone() });
        }

        let modified_at =
            ModifiedTime::of_metadata(&metadata).map_err(|e| VerifyFailure::Unreadable {
                path: rel.clone(),
                detail: e.to_string(),
            })?;

        if metadata.len() == entry.size_bytes && modified_at == entry.modified_at {
            debug!("Fast path: {}", rel);
            return Ok(false);
        }

        debug!(
            "Slow path: {} (size {} vs {}, mtime {} vs {})",
            rel, metadata.len(), entry.size_bytes, modified_at.0, entry.modified_at.0
        );
        let actual = self
            .hasher
            .hash_file(&path)
            .map_err(|e| VerifyFailure::Unreadable {
                path: rel.clone(),
                detail: e.to_string(),
            })?;

        if actual != entry.content_hash {
            return Err(VerifyFailure::Corrupt { path: rel.clone() });
        }
        Ok(true)
    }
}

impl<'a, H: ContentHasher + ?Sized> Iterator for Verification<'a, H> {
    type Item = VerifyEvent;

    fn next(&mut self) -> Option<VerifyEvent> {
        if self.report_emitted {
            return None;
        }
        match self.step() {
            Ok(progress) => Some(VerifyEvent::Progress(progress)),
            Err(report) => {
                self.report_emitted = true;
                Some(VerifyEvent::Finished(report))
            }
        }
    }
}
