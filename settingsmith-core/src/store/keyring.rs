//! OS keyring-backed credential lookup.

use async_trait::async_trait;
use keyring::Entry;
use zeroize::Zeroizing;

use super::{CredentialStore, StoreError, decode_credential};
use crate::credential::Credential;
use crate::execution::Execution;
use crate::model::CredentialId;

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// # Storage Key Format
///
/// Credentials are stored as JSON documents under the keyring service
/// `{service_name}/credentials/{credential_id}`.
///
/// # Example
///
/// ```rust,ignore
/// use settingsmith_core::{Credential, KeyringCredentialStore, Secret};
///
/// let store = KeyringCredentialStore::try_new("settingsmith").unwrap();
/// store.store(&"nexus-deploy".into(), &Credential::UsernamePassword {
///     username: "ci".into(),
///     password: Secret::new("s3cr3t"),
/// }).unwrap();
/// ```
pub struct KeyringCredentialStore {
    service_name: String,
}

impl KeyringCredentialStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend is not available on this platform.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        let probe = format!("{}/__probe__", service_name);
        match Entry::new(&probe, "availability_check") {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StoreError::KeyringUnavailable {
                message: format!("keyring backend not available: {}", e),
            }),
        }
    }

    fn key(&self, credential_id: &CredentialId) -> String {
        format!("{}/credentials/{}", self.service_name, credential_id)
    }

    fn create_entry(&self, credential_id: &CredentialId) -> Result<Entry, StoreError> {
        Entry::new(&self.key(credential_id), "settingsmith").map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }

    /// Store a credential, overwriting any existing entry.
    pub fn store(&self, credential_id: &CredentialId, credential: &Credential) -> Result<(), StoreError> {
        let entry = self.create_entry(credential_id)?;
        let document = serde_json::to_string(credential)
            .map(Zeroizing::new)
            .map_err(|e| StoreError::decode(self.key(credential_id), &e))?;

        entry
            .set_password(&document)
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to store credential {}: {}", credential_id, e),
            })
    }

    /// Delete a credential.
    ///
    /// Returns `Ok(())` even if the credential didn't exist.
    pub fn delete(&self, credential_id: &CredentialId) -> Result<(), StoreError> {
        let entry = self.create_entry(credential_id)?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}

impl std::fmt::Debug for KeyringCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringCredentialStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn lookup(
        &self,
        _execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        let entry = self.create_entry(credential_id)?;
        let key = self.key(credential_id);

        match entry.get_password() {
            Ok(document) => {
                let document = Zeroizing::new(document);
                decode_credential(&key, &document).map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::BackendError {
                message: format!("ambiguous keyring entry for {}", key),
            }),
            Err(keyring::Error::PlatformFailure(e)) => Err(StoreError::BackendError {
                message: format!("platform keyring failure: {}", e),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }
}
