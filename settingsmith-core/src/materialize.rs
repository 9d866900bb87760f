//! Turning stored credentials into something a `<server>` entry can use.
//!
//! Username/password pairs pass through. Key and certificate material is
//! written to a tracked, owner-only file in the execution's scratch
//! directory and referenced by path.

use std::path::Path;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::credential::{Credential, ResolvedCredential};
use crate::execution::Execution;
use crate::model::CredentialId;

const PRIVATE_KEY_PREFIX: &str = "private-key-";
const CERTIFICATE_PREFIX: &str = "certificate-";
const PEM_SUFFIX: &str = ".pem";

/// Error type for materialization.
///
/// Only [`SecretFileWrite`](Self::SecretFileWrite) is fatal to the supply
/// operation; the other variants cause the mapping to be skipped.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The credential kind cannot be expressed in a `<server>` entry.
    #[error("credential {credential_id} of kind {kind} is not supported for Maven servers")]
    Unsupported {
        credential_id: CredentialId,
        kind: &'static str,
    },

    /// An SSH credential carried no private key.
    #[error("credential {credential_id} has no private key")]
    NoPrivateKey { credential_id: CredentialId },

    /// The secret file could not be written.
    #[error("failed to write secret file for credential {credential_id}")]
    SecretFileWrite {
        credential_id: CredentialId,
        #[source]
        source: ArtifactError,
    },
}

impl MaterializeError {
    /// Whether the whole supply operation must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SecretFileWrite { .. })
    }
}

/// Materializes credentials for one execution into one scratch directory.
pub struct CredentialMaterializer<'a> {
    execution: &'a Execution,
    scratch_dir: &'a Path,
}

impl<'a> CredentialMaterializer<'a> {
    pub fn new(execution: &'a Execution, scratch_dir: &'a Path) -> Self {
        Self {
            execution,
            scratch_dir,
        }
    }

    /// Produce the [`ResolvedCredential`] for `credential`.
    ///
    /// Creates at most one file, tracked against the execution before any
    /// secret byte is written to it.
    pub fn materialize(
        &self,
        credential_id: &CredentialId,
        credential: Credential,
    ) -> Result<ResolvedCredential, MaterializeError> {
        match credential {
            Credential::UsernamePassword { username, password } => {
                Ok(ResolvedCredential::UsernamePassword { username, password })
            }
            Credential::SshPrivateKey {
                username,
                private_keys,
                passphrase,
            } => {
                let Some(key) = private_keys.first() else {
                    return Err(MaterializeError::NoPrivateKey {
                        credential_id: credential_id.clone(),
                    });
                };
                if private_keys.len() > 1 {
                    self.execution.diagnostics().warn(&format!(
                        "Credentials {} define {} private keys, only the first one is used",
                        credential_id,
                        private_keys.len()
                    ));
                }
                let file_path = self.write_secret(credential_id, PRIVATE_KEY_PREFIX, key.expose())?;
                Ok(ResolvedCredential::SecretFile {
                    username,
                    file_path,
                    passphrase,
                })
            }
            Credential::Certificate {
                username,
                certificate_pem,
                password,
            } => {
                let certificate_path =
                    self.write_secret(credential_id, CERTIFICATE_PREFIX, certificate_pem.expose())?;
                Ok(ResolvedCredential::Certificate {
                    username,
                    certificate_path,
                    password,
                })
            }
            other => Err(MaterializeError::Unsupported {
                credential_id: credential_id.clone(),
                kind: other.kind(),
            }),
        }
    }

    fn write_secret(
        &self,
        credential_id: &CredentialId,
        prefix: &str,
        contents: &str,
    ) -> Result<std::path::PathBuf, MaterializeError> {
        let path = self
            .execution
            .tracker()
            .write_artifact(
                self.execution.id(),
                self.scratch_dir,
                prefix,
                PEM_SUFFIX,
                contents.as_bytes(),
            )
            .map_err(|source| MaterializeError::SecretFileWrite {
                credential_id: credential_id.clone(),
                source,
            })?;
        tracing::debug!(
            credential_id = %credential_id,
            path = %path.display(),
            "wrote secret file"
        );
        Ok(path)
    }
}
