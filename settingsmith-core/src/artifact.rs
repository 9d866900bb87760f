//! Scoped temporary files and their cleanup.
//!
//! Every file written for an execution (private keys, certificates, the
//! final settings document) is recorded against that execution's id the
//! moment it is created on disk. [`TempArtifactTracker::release_all`]
//! deletes them when the execution ends.
//!
//! # Lifecycle
//!
//! `Allocated` (empty file exists, already tracked) → `Written` (content
//! synced) → `Released` (deleted or found missing). `Released` is terminal.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::diagnostics::Diagnostics;
use crate::execution::ExecutionId;

/// Error type for artifact creation.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// A uniquely named file could not be created.
    #[error("failed to create temporary file in {}: {source}", dir.display())]
    Create {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The content could not be written. The file stays tracked.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where an artifact is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Allocated,
    Written,
    Released,
}

/// A file created on behalf of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempArtifact {
    pub path: PathBuf,
    pub created_by: ExecutionId,
    pub allocated_at: DateTime<Utc>,
    pub state: ArtifactState,
}

/// Outcome of [`TempArtifactTracker::release_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Files deleted by this call.
    pub removed: Vec<PathBuf>,

    /// Files that were already gone.
    pub already_absent: Vec<PathBuf>,

    /// Files that could not be deleted; each was reported as a warning.
    pub failed: Vec<PathBuf>,
}

impl ReleaseReport {
    /// Number of artifacts this call handled.
    pub fn total(&self) -> usize {
        self.removed.len() + self.already_absent.len() + self.failed.len()
    }
}

/// Registry of temporary artifacts keyed by execution.
///
/// # Thread Safety
///
/// Safe to share across threads via `Arc`. File names come from exclusive
/// creation, so concurrent allocations in one directory never collide.
#[derive(Default)]
pub struct TempArtifactTracker {
    artifacts: Mutex<HashMap<ExecutionId, Vec<TempArtifact>>>,
}

impl TempArtifactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty, uniquely named file `{prefix}XXXX{suffix}` in `scratch_dir`.
    ///
    /// On unix the file is created with mode `0600`. The file is not tracked;
    /// see [`track`](Self::track) and [`write_artifact`](Self::write_artifact).
    pub fn allocate(
        &self,
        scratch_dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> Result<(File, PathBuf), ArtifactError> {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(scratch_dir)
            .map_err(|source| ArtifactError::Create {
                dir: scratch_dir.to_path_buf(),
                source,
            })?;

        temp.keep().map_err(|e| ArtifactError::Create {
            dir: scratch_dir.to_path_buf(),
            source: e.error,
        })
    }

    /// Record `path` for deletion when `execution` is released.
    ///
    /// Tracking a path twice for the same execution is a no-op.
    pub fn track(&self, path: impl Into<PathBuf>, execution: &ExecutionId) {
        let path = path.into();
        let mut artifacts = self.artifacts.lock();
        let list = artifacts.entry(execution.clone()).or_default();
        if list.iter().any(|a| a.path == path) {
            return;
        }
        tracing::debug!(execution = %execution, path = %path.display(), "tracking temporary artifact");
        list.push(TempArtifact {
            path,
            created_by: execution.clone(),
            allocated_at: Utc::now(),
            state: ArtifactState::Allocated,
        });
    }

    fn set_state(&self, path: &Path, execution: &ExecutionId, state: ArtifactState) {
        let mut artifacts = self.artifacts.lock();
        if let Some(artifact) = artifacts
            .get_mut(execution)
            .and_then(|list| list.iter_mut().find(|a| a.path == path))
        {
            if artifact.state != ArtifactState::Released {
                artifact.state = state;
            }
        }
    }

    /// Allocate, track, write and sync a new artifact in one step.
    ///
    /// The file is tracked before any content is written, so a failed or
    /// interrupted write still leaves it reachable for cleanup.
    pub fn write_artifact(
        &self,
        execution: &ExecutionId,
        scratch_dir: &Path,
        prefix: &str,
        suffix: &str,
        contents: &[u8],
    ) -> Result<PathBuf, ArtifactError> {
        let (mut file, path) = self.allocate(scratch_dir, prefix, suffix)?;
        self.track(&path, execution);

        file.write_all(contents)
            .and_then(|()| file.sync_all())
            .map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;

        self.set_state(&path, execution, ArtifactState::Written);
        Ok(path)
    }

    /// Snapshot of the artifacts recorded for `execution`.
    pub fn artifacts(&self, execution: &ExecutionId) -> Vec<TempArtifact> {
        self.artifacts
            .lock()
            .get(execution)
            .cloned()
            .unwrap_or_default()
    }

    /// Delete every unreleased artifact of `execution`.
    ///
    /// Missing files count as released. Deletion failures are reported to
    /// `diagnostics` as warnings and never returned as errors. Calling this
    /// again for the same execution only handles artifacts tracked since.
    pub fn release_all(&self, execution: &ExecutionId, diagnostics: &dyn Diagnostics) -> ReleaseReport {
        // Flip states under the lock so concurrent releases never delete twice.
        let pending: Vec<PathBuf> = {
            let mut artifacts = self.artifacts.lock();
            match artifacts.get_mut(execution) {
                Some(list) => list
                    .iter_mut()
                    .filter(|a| a.state != ArtifactState::Released)
                    .map(|a| {
                        a.state = ArtifactState::Released;
                        a.path.clone()
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut report = ReleaseReport::default();
        for path in pending {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(execution = %execution, path = %path.display(), "deleted temporary artifact");
                    report.removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    report.already_absent.push(path);
                }
                Err(e) => {
                    diagnostics.warn(&format!(
                        "Failed to delete temporary file {}: {}",
                        path.display(),
                        e
                    ));
                    report.failed.push(path);
                }
            }
        }

        if report.total() > 0 {
            tracing::info!(
                execution = %execution,
                removed = report.removed.len(),
                already_absent = report.already_absent.len(),
                failed = report.failed.len(),
                "released temporary artifacts"
            );
        }
        report
    }

    /// Drop the records of `execution` without touching the filesystem.
    ///
    /// Call after [`release_all`](Self::release_all) once the execution is gone.
    pub fn forget(&self, execution: &ExecutionId) {
        self.artifacts.lock().remove(execution);
    }
}

impl std::fmt::Debug for TempArtifactTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let artifacts = self.artifacts.lock();
        f.debug_struct("TempArtifactTracker")
            .field("executions", &artifacts.len())
            .field("artifacts", &artifacts.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Level, RecordingDiagnostics};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_creates_unique_empty_files() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();

        let (_, first) = tracker.allocate(dir.path(), "maven-", "-settings.xml").unwrap();
        let (_, second) = tracker.allocate(dir.path(), "maven-", "-settings.xml").unwrap();

        assert_ne!(first, second);
        for path in [&first, &second] {
            assert!(path.exists());
            assert_eq!(std::fs::metadata(path).unwrap().len(), 0);
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("maven-"));
            assert!(name.ends_with("-settings.xml"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_allocate_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let (_, path) = tracker.allocate(dir.path(), "private-key-", ".pem").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_allocate_in_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let result = tracker.allocate(&dir.path().join("nope"), "a-", ".b");
        assert!(matches!(result, Err(ArtifactError::Create { .. })));
    }

    #[test]
    fn test_concurrent_allocations_never_collide() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(TempArtifactTracker::new());
        let execution = ExecutionId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let execution = execution.clone();
                let dir = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    (0..16)
                        .map(|_| {
                            tracker
                                .write_artifact(&execution, &dir, "private-key-", ".pem", b"k")
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let paths: HashSet<PathBuf> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(paths.len(), 128);
        assert_eq!(tracker.artifacts(&execution).len(), 128);
    }

    #[test]
    fn test_write_artifact_tracks_and_marks_written() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let execution = ExecutionId::new();

        let path = tracker
            .write_artifact(&execution, dir.path(), "maven-", "-settings.xml", b"<settings/>")
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<settings/>");
        let artifacts = tracker.artifacts(&execution);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, path);
        assert_eq!(artifacts[0].created_by, execution);
        assert_eq!(artifacts[0].state, ArtifactState::Written);
    }

    #[test]
    fn test_track_is_idempotent() {
        let tracker = TempArtifactTracker::new();
        let execution = ExecutionId::new();
        tracker.track("/tmp/a", &execution);
        tracker.track("/tmp/a", &execution);
        assert_eq!(tracker.artifacts(&execution).len(), 1);
        assert_eq!(tracker.artifacts(&execution)[0].state, ArtifactState::Allocated);
    }

    #[test]
    fn test_release_all_deletes_only_own_artifacts() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let diagnostics = RecordingDiagnostics::new();
        let mine = ExecutionId::new();
        let theirs = ExecutionId::new();

        let a = tracker.write_artifact(&mine, dir.path(), "a-", ".tmp", b"a").unwrap();
        let b = tracker.write_artifact(&mine, dir.path(), "b-", ".tmp", b"b").unwrap();
        let c = tracker.write_artifact(&theirs, dir.path(), "c-", ".tmp", b"c").unwrap();

        let report = tracker.release_all(&mine, &diagnostics);

        assert_eq!(report.removed.len(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(c.exists());
        assert!(tracker
            .artifacts(&mine)
            .iter()
            .all(|a| a.state == ArtifactState::Released));
        assert_eq!(tracker.artifacts(&theirs)[0].state, ArtifactState::Written);
    }

    #[test]
    fn test_release_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let diagnostics = RecordingDiagnostics::new();
        let execution = ExecutionId::new();
        tracker.write_artifact(&execution, dir.path(), "a-", ".tmp", b"a").unwrap();

        assert_eq!(tracker.release_all(&execution, &diagnostics).removed.len(), 1);
        assert_eq!(tracker.release_all(&execution, &diagnostics), ReleaseReport::default());
    }

    #[test]
    fn test_release_tolerates_missing_files() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let diagnostics = RecordingDiagnostics::new();
        let execution = ExecutionId::new();

        let path = tracker.write_artifact(&execution, dir.path(), "a-", ".tmp", b"a").unwrap();
        std::fs::remove_file(&path).unwrap();
        tracker.track(dir.path().join("never-created"), &execution);

        let report = tracker.release_all(&execution, &diagnostics);
        assert_eq!(report.already_absent.len(), 2);
        assert!(report.failed.is_empty());
        assert!(diagnostics.messages_at(Level::Warn).is_empty());
    }

    #[test]
    fn test_release_failure_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let tracker = TempArtifactTracker::new();
        let diagnostics = RecordingDiagnostics::new();
        let execution = ExecutionId::new();

        // A directory cannot be removed with remove_file.
        let sub = dir.path().join("not-a-file");
        std::fs::create_dir(&sub).unwrap();
        tracker.track(&sub, &execution);

        let report = tracker.release_all(&execution, &diagnostics);
        assert_eq!(report.failed, vec![sub.clone()]);
        assert_eq!(diagnostics.messages_at(Level::Warn).len(), 1);
        assert!(sub.exists());
    }

    #[test]
    fn test_forget_drops_records() {
        let tracker = TempArtifactTracker::new();
        let execution = ExecutionId::new();
        tracker.track("/tmp/whatever", &execution);
        tracker.forget(&execution);
        assert!(tracker.artifacts(&execution).is_empty());
    }
}
