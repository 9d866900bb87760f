//! Resolving server-to-credential mappings for one execution.

use std::path::Path;

use crate::credential::ResolvedCredential;
use crate::error::ProviderError;
use crate::execution::Execution;
use crate::materialize::{CredentialMaterializer, MaterializeError};
use crate::model::{ServerCredentialMapping, ServerId};
use crate::store::{CredentialStore, StoreError};

/// Server id to resolved credential, in first-insertion order.
///
/// Inserting an existing server id replaces its credential but keeps its
/// position, so the merger touches servers in the order they were declared.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCredentialMap {
    entries: Vec<(ServerId, ResolvedCredential)>,
}

impl ResolvedCredentialMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous credential for `server_id`.
    pub fn insert(&mut self, server_id: ServerId, credential: ResolvedCredential) -> Option<ResolvedCredential> {
        match self.entries.iter_mut().find(|(id, _)| *id == server_id) {
            Some((_, existing)) => Some(std::mem::replace(existing, credential)),
            None => {
                self.entries.push((server_id, credential));
                None
            }
        }
    }

    pub fn get(&self, server_id: &ServerId) -> Option<&ResolvedCredential> {
        self.entries
            .iter()
            .find(|(id, _)| id == server_id)
            .map(|(_, credential)| credential)
    }

    pub fn contains(&self, server_id: &ServerId) -> bool {
        self.get(server_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServerId, &ResolvedCredential)> {
        self.entries.iter().map(|(id, credential)| (id, credential))
    }

    pub fn server_ids(&self) -> impl Iterator<Item = &ServerId> {
        self.entries.iter().map(|(id, _)| id)
    }
}

/// Resolves mappings through a [`CredentialStore`] and materializes the hits.
pub struct CredentialResolver<'a> {
    execution: &'a Execution,
    store: &'a dyn CredentialStore,
    scratch_dir: &'a Path,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(execution: &'a Execution, store: &'a dyn CredentialStore, scratch_dir: &'a Path) -> Self {
        Self {
            execution,
            store,
            scratch_dir,
        }
    }

    /// Resolve every mapping in order.
    ///
    /// Unknown ids, store failures and unusable credential kinds are skipped
    /// with a warning. Only interruption and secret file write failures
    /// abort; in both cases every file written so far stays tracked.
    pub async fn resolve(
        &self,
        mappings: &[ServerCredentialMapping],
    ) -> Result<ResolvedCredentialMap, ProviderError> {
        let materializer = CredentialMaterializer::new(self.execution, self.scratch_dir);
        let diagnostics = self.execution.diagnostics();
        let mut resolved = ResolvedCredentialMap::new();

        for mapping in mappings {
            if self.execution.is_interrupted() {
                return Err(ProviderError::Interrupted);
            }

            let credential = match self.store.lookup(self.execution, &mapping.credential_id).await {
                Ok(Some(credential)) => credential,
                Ok(None) => {
                    diagnostics.warn(&format!(
                        "Could not find credentials [{}] for server {}",
                        mapping.credential_id, mapping.server_id
                    ));
                    continue;
                }
                Err(StoreError::Interrupted) => return Err(ProviderError::Interrupted),
                Err(e) => {
                    tracing::warn!(
                        credential_id = %mapping.credential_id,
                        error = %e,
                        "credential lookup failed"
                    );
                    diagnostics.warn(&format!(
                        "Could not find credentials [{}] for server {}",
                        mapping.credential_id, mapping.server_id
                    ));
                    continue;
                }
            };

            match materializer.materialize(&mapping.credential_id, credential) {
                Ok(credential) => {
                    if resolved.insert(mapping.server_id.clone(), credential).is_some() {
                        tracing::debug!(server_id = %mapping.server_id, "later mapping replaces earlier one");
                    }
                }
                Err(MaterializeError::SecretFileWrite { credential_id, source }) => {
                    return Err(ProviderError::SecretFileWrite { credential_id, source });
                }
                Err(e) => {
                    diagnostics.warn(&format!(
                        "Could not use credentials [{}] for server {}: {}",
                        mapping.credential_id, mapping.server_id, e
                    ));
                }
            }
        }

        tracing::debug!(
            execution = %self.execution.id(),
            requested = mappings.len(),
            resolved = resolved.len(),
            "resolved server credentials"
        );
        Ok(resolved)
    }
}
