//! Credential and template lookup abstractions.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialStore`] - Trait for credential lookup backends
//! - [`TemplateStore`] - Trait for settings template lookup
//! - [`MemoryCredentialStore`] / [`MemoryTemplateStore`] - In-memory implementations
//! - [`KeyringCredentialStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`EnvCredentialStore`] - Credentials passed through environment variables
//! - [`ChainStore`] - Ordered fallback across several credential stores
//! - [`create_credential_store`] - Helper to select backends based on availability
//!
//! # Credential Encoding
//!
//! Keyring and environment backends hold credentials as JSON documents
//! tagged by `kind`, for example:
//!
//! ```json
//! {"kind": "username_password", "username": "deployer", "password": "..."}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::credential::Credential;
use crate::execution::Execution;
use crate::model::{CredentialId, SettingsConfig, TemplateId};

mod env;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use env::EnvCredentialStore;
pub use memory::{MemoryCredentialStore, MemoryTemplateStore};
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringCredentialStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the backing buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for store operations.
///
/// Messages carry keys and identifiers only, never stored values.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Access to the entry was denied for this execution.
    #[error("access denied to {key}")]
    AccessDenied { key: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// A stored credential document could not be decoded.
    ///
    /// Only the position is kept; decoder messages may quote stored values.
    #[error("malformed credential document for {key} at line {line}, column {column}")]
    Decode { key: String, line: usize, column: usize },

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },

    /// The lookup was cancelled by the execution owner.
    #[error("interrupted")]
    Interrupted,
}

impl StoreError {
    /// Build a [`StoreError::Decode`] without retaining the decoder message.
    pub fn decode(key: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Decode {
            key: key.into(),
            line: err.line(),
            column: err.column(),
        }
    }
}

/// Decode a JSON credential document.
pub(crate) fn decode_credential(key: &str, raw: &str) -> Result<Credential, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::decode(key, &e))
}

/// Credential lookup, scoped by the permissions of an execution.
///
/// Implementations must be safe for concurrent reads from many executions.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by id.
    ///
    /// Returns `Ok(None)` if the id is unknown or not visible to `execution`.
    async fn lookup(
        &self,
        execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    async fn lookup(
        &self,
        execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        (**self).lookup(execution, credential_id).await
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    async fn lookup(
        &self,
        execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        (**self).lookup(execution, credential_id).await
    }
}

/// Named settings template lookup.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Fetch a template and its credential mappings by id.
    ///
    /// Returns `Ok(None)` if no template has that id.
    async fn get_by_id(
        &self,
        execution: &Execution,
        template_id: &TemplateId,
    ) -> Result<Option<SettingsConfig>, StoreError>;

    /// List every template visible to `execution`.
    async fn list(&self, execution: &Execution) -> Result<Vec<SettingsConfig>, StoreError>;
}

/// Tries each credential store in order until one knows the id.
///
/// Backend errors from one store are logged and the next store is tried;
/// interruption stops the chain immediately.
#[derive(Default)]
pub struct ChainStore {
    stores: Vec<Box<dyn CredentialStore>>,
}

impl ChainStore {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a store to the chain.
    pub fn with(mut self, store: impl CredentialStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }

    /// Number of stores in the chain.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether the chain has no stores.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore")
            .field("stores", &self.stores.len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for ChainStore {
    async fn lookup(
        &self,
        execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        let mut last_error = None;

        for store in &self.stores {
            match store.lookup(execution, credential_id).await {
                Ok(Some(credential)) => return Ok(Some(credential)),
                Ok(None) => {}
                Err(StoreError::Interrupted) => return Err(StoreError::Interrupted),
                Err(e) => {
                    tracing::debug!(credential_id = %credential_id, error = %e, "credential store failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Create a credential store with automatic backend selection.
///
/// # Backend Selection Logic
///
/// - If `prefer_keyring` is `true` and the `keyring-store` feature is enabled,
///   a [`KeyringCredentialStore`] is tried first; an unavailable keyring is
///   skipped with a warning.
/// - If `env_prefix` is set, an [`EnvCredentialStore`] reading the process
///   environment is appended.
/// - With no usable backend an empty [`MemoryCredentialStore`] is returned,
///   so every lookup reports "not found".
pub fn create_credential_store(
    prefer_keyring: bool,
    env_prefix: Option<&str>,
) -> Box<dyn CredentialStore> {
    let mut chain = ChainStore::new();

    #[cfg(feature = "keyring-store")]
    if prefer_keyring {
        match KeyringCredentialStore::try_new("settingsmith") {
            Ok(store) => {
                tracing::info!("Using OS keyring for credential lookup");
                chain = chain.with(store);
            }
            Err(e) => {
                tracing::warn!("Keyring unavailable ({}), skipping keyring credentials", e);
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if prefer_keyring {
        tracing::warn!(
            "Keyring lookup requested but keyring-store feature not enabled. \
             Keyring credentials are unavailable."
        );
    }

    if let Some(prefix) = env_prefix {
        tracing::debug!(prefix, "Using environment variables for credential lookup");
        chain = chain.with(EnvCredentialStore::from_env(prefix));
    }

    if chain.is_empty() {
        tracing::warn!("No credential backend available; credentials will not resolve");
        return Box::new(MemoryCredentialStore::new());
    }

    Box::new(chain)
}
