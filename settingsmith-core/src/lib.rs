//! # Settingsmith Core
//!
//! Credential resolution and settings-merge engine for Maven builds.
//!
//! This crate provides:
//! - Domain types for settings templates and server-to-credential mappings
//! - Traits for credential and template lookup, with in-memory, keyring
//!   and environment backends
//! - Materialization of credentials into plaintext pairs or scoped key files
//! - A byte-preserving rewriter for the `<servers>` section of `settings.xml`
//! - A temp-artifact tracker that deletes every secret file when the
//!   execution that created it ends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use settingsmith_core::{
//!     Execution, ProvidedSettingsProvider, ScratchRoot, SettingsProvider, TempArtifactTracker,
//! };
//!
//! async fn run(provider: &ProvidedSettingsProvider) -> Result<(), settingsmith_core::ProviderError> {
//!     let execution = Execution::new("nightly #42", Arc::new(TempArtifactTracker::new()));
//!     let scratch = ScratchRoot::new("/var/tmp/settingsmith");
//!     if let Some(path) = provider.supply_settings(&execution, &scratch).await? {
//!         println!("mvn -s {}", path.display());
//!     }
//!     execution.release();
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod materialize;
pub mod merge;
pub mod model;
pub mod provider;
pub mod resolve;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{
    CredentialId,
    MergePolicy,
    ServerCredentialMapping,
    ServerId,
    SettingsConfig,
    SettingsTemplate,
    TemplateId,
};

pub use store::{
    ChainStore,
    CredentialStore,
    EnvCredentialStore,
    MemoryCredentialStore,
    MemoryTemplateStore,
    Secret,
    StoreError,
    TemplateStore,
    create_credential_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringCredentialStore;

pub use credential::{Credential, ResolvedCredential};

pub use artifact::{ArtifactError, ArtifactState, ReleaseReport, TempArtifact, TempArtifactTracker};

pub use diagnostics::{Diagnostics, Level, RecordingDiagnostics, TracingDiagnostics};

pub use execution::{
    Execution,
    ExecutionId,
    InterruptHandle,
    OutputVariables,
    RecordedVariables,
    ScratchDirProvider,
    ScratchRoot,
    WorkspaceTempDir,
};

pub use materialize::{CredentialMaterializer, MaterializeError};

pub use resolve::{CredentialResolver, ResolvedCredentialMap};

pub use merge::{MergeError, SettingsMerger};

pub use provider::{
    DefaultSettingsProvider,
    ProvidedSettingsProvider,
    ProviderOptions,
    SettingsProvider,
};

pub use error::ProviderError;
