//! The execution context a settings file is supplied for.
//!
//! This module provides:
//! - [`ExecutionId`] - Unique id of one build execution
//! - [`Execution`] - The execution record: cleanup obligations, interruption
//!   flag, diagnostics sink and optional output variables
//! - [`OutputVariables`] - Capability to expose named values to later steps
//! - [`ScratchDirProvider`] - Where per-execution temporary files go, with
//!   [`WorkspaceTempDir`] and [`ScratchRoot`] implementations

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::artifact::{ReleaseReport, TempArtifact, TempArtifactTracker};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};

/// Unique id of one execution; keys its temporary artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability to expose named values (e.g. `MVN_SETTINGS`) to later steps.
pub trait OutputVariables: Send + Sync {
    fn set(&self, name: &str, value: &str);
}

/// [`OutputVariables`] that keeps values in memory for the host to read.
#[derive(Debug, Default)]
pub struct RecordedVariables {
    vars: Mutex<BTreeMap<String, String>>,
}

impl RecordedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.lock().get(name).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars.lock().clone()
    }
}

impl OutputVariables for RecordedVariables {
    fn set(&self, name: &str, value: &str) {
        self.vars.lock().insert(name.to_string(), value.to_string());
    }
}

/// Cloneable handle that can interrupt an execution from another task.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One build execution.
///
/// Owns the cleanup obligations for everything written on its behalf.
/// [`release`](Self::release) deletes them; dropping the execution releases
/// anything still outstanding, so an aborted host does not leak secrets.
pub struct Execution {
    id: ExecutionId,
    name: String,
    tracker: Arc<TempArtifactTracker>,
    diagnostics: Arc<dyn Diagnostics>,
    outputs: Option<Arc<dyn OutputVariables>>,
    interrupted: Arc<AtomicBool>,
}

impl Execution {
    /// Create an execution with a fresh id, logging diagnostics via `tracing`.
    pub fn new(name: impl Into<String>, tracker: Arc<TempArtifactTracker>) -> Self {
        let id = ExecutionId::new();
        let name = name.into();
        Self {
            diagnostics: Arc::new(TracingDiagnostics::new(format!("{} ({})", name, id))),
            id,
            name,
            tracker,
            outputs: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send diagnostics to `diagnostics` instead of `tracing`.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Declare that this execution can expose output variables.
    pub fn with_output_variables(mut self, outputs: Arc<dyn OutputVariables>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    /// Human-readable name, used in diagnostics and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn diagnostics(&self) -> &dyn Diagnostics {
        self.diagnostics.as_ref()
    }

    /// The output variable capability, if the execution has one.
    pub fn output_variables(&self) -> Option<&dyn OutputVariables> {
        self.outputs.as_deref()
    }

    pub fn tracker(&self) -> &TempArtifactTracker {
        &self.tracker
    }

    /// Register a path for deletion at teardown.
    pub fn add_cleanup(&self, path: impl Into<PathBuf>) {
        self.tracker.track(path, &self.id);
    }

    /// Artifacts currently recorded for this execution.
    pub fn artifacts(&self) -> Vec<TempArtifact> {
        self.tracker.artifacts(&self.id)
    }

    /// Request cancellation; in-flight work stops at its next check.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupted))
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Delete every artifact recorded for this execution.
    pub fn release(&self) -> ReleaseReport {
        self.tracker.release_all(&self.id, self.diagnostics.as_ref())
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.release();
        self.tracker.forget(&self.id);
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("output_variables", &self.outputs.is_some())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Supplies an existing, writable scratch directory for an execution.
pub trait ScratchDirProvider: Send + Sync {
    fn for_execution(&self, execution: &Execution) -> io::Result<PathBuf>;
}

fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// The `<workspace>@tmp` sibling directory convention.
///
/// Keeps secret files out of the workspace itself so build tools that
/// archive or scan the workspace never pick them up.
#[derive(Debug, Clone)]
pub struct WorkspaceTempDir {
    workspace: PathBuf,
}

impl WorkspaceTempDir {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// The scratch directory path, without creating it.
    pub fn path(&self) -> PathBuf {
        let name = self
            .workspace
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let tmp = format!("{}@tmp", name);
        match self.workspace.parent() {
            Some(parent) => parent.join(tmp),
            None => PathBuf::from(tmp),
        }
    }
}

impl ScratchDirProvider for WorkspaceTempDir {
    fn for_execution(&self, _execution: &Execution) -> io::Result<PathBuf> {
        let dir = self.path();
        ensure_private_dir(&dir)?;
        Ok(dir)
    }
}

/// One subdirectory per execution under a common root.
#[derive(Debug, Clone)]
pub struct ScratchRoot {
    root: PathBuf,
}

impl ScratchRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir_for(&self, execution: &Execution) -> PathBuf {
        self.root.join(execution.id().to_string())
    }

    /// Remove the execution's directory if it is empty.
    ///
    /// Non-empty directories are left alone; their files belong to the tracker.
    pub fn remove_if_empty(&self, execution: &Execution) -> io::Result<()> {
        match std::fs::remove_dir(self.dir_for(execution)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl ScratchDirProvider for ScratchRoot {
    fn for_execution(&self, execution: &Execution) -> io::Result<PathBuf> {
        let dir = self.dir_for(execution);
        ensure_private_dir(&dir)?;
        Ok(dir)
    }
}
