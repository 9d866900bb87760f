//! In-memory credential and template stores.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{CredentialStore, StoreError, TemplateStore};
use crate::credential::Credential;
use crate::execution::Execution;
use crate::model::{CredentialId, SettingsConfig, TemplateId};

/// In-memory credential store for tests and embedding hosts.
///
/// Every credential is visible to every execution.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryCredentialStore {
    data: RwLock<HashMap<CredentialId, Credential>>,
}

impl MemoryCredentialStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a credential.
    pub fn insert(&self, id: impl Into<CredentialId>, credential: Credential) {
        self.data.write().insert(id.into(), credential);
    }

    /// Remove a credential. Returns `true` if it existed.
    pub fn remove(&self, id: &CredentialId) -> bool {
        self.data.write().remove(id).is_some()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("credentials_count", &self.data.read().len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(
        &self,
        _execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.data.read().get(credential_id).cloned())
    }
}

/// In-memory template store.
///
/// Templates are kept in insertion order so listings are stable.
#[derive(Default)]
pub struct MemoryTemplateStore {
    data: RwLock<Vec<SettingsConfig>>,
}

impl MemoryTemplateStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with initial configs.
    pub fn with_configs(configs: impl IntoIterator<Item = SettingsConfig>) -> Self {
        let store = Self::new();
        for config in configs {
            store.insert(config);
        }
        store
    }

    /// Add a config, replacing any existing one with the same template id.
    pub fn insert(&self, config: impl Into<SettingsConfig>) {
        let config = config.into();
        let mut data = self.data.write();
        match data.iter_mut().find(|c| c.id() == config.id()) {
            Some(existing) => *existing = config,
            None => data.push(config),
        }
    }
}

impl std::fmt::Debug for MemoryTemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTemplateStore")
            .field("templates_count", &self.data.read().len())
            .finish()
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get_by_id(
        &self,
        _execution: &Execution,
        template_id: &TemplateId,
    ) -> Result<Option<SettingsConfig>, StoreError> {
        Ok(self
            .data
            .read()
            .iter()
            .find(|c| c.id() == template_id)
            .cloned())
    }

    async fn list(&self, _execution: &Execution) -> Result<Vec<SettingsConfig>, StoreError> {
        Ok(self.data.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TempArtifactTracker;
    use crate::model::SettingsTemplate;
    use crate::store::Secret;
    use std::sync::Arc;

    fn execution() -> Execution {
        Execution::new("memory-test", Arc::new(TempArtifactTracker::new()))
    }

    #[tokio::test]
    async fn test_memory_credential_store_insert_lookup() {
        let store = MemoryCredentialStore::new();
        store.insert(
            "deploy",
            Credential::UsernamePassword {
                username: "ci".to_string(),
                password: Secret::new("pw"),
            },
        );

        let found = store.lookup(&execution(), &CredentialId::new("deploy")).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_memory_credential_store_lookup_nonexistent() {
        let store = MemoryCredentialStore::new();
        let found = store.lookup(&execution(), &CredentialId::new("nope")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_memory_credential_store_remove() {
        let store = MemoryCredentialStore::new();
        store.insert("deploy", Credential::SecretText { secret: Secret::new("x") });

        assert!(store.remove(&CredentialId::new("deploy")));
        assert!(!store.remove(&CredentialId::new("deploy")));
        let found = store.lookup(&execution(), &CredentialId::new("deploy")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_memory_template_store_replaces_same_id() {
        let store = MemoryTemplateStore::new();
        store.insert(SettingsTemplate::new("corp", "Corporate", "<settings/>"));
        store.insert(SettingsTemplate::new("other", "Other", "<settings/>"));
        store.insert(SettingsTemplate::new("corp", "Corporate v2", "<settings></settings>"));

        let exec = execution();
        let all = store.list(&exec).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].template.name, "Corporate v2");

        let found = store.get_by_id(&exec, &TemplateId::new("corp")).await.unwrap().unwrap();
        assert_eq!(found.template.content, "<settings></settings>");
        assert!(store.get_by_id(&exec, &TemplateId::new("missing")).await.unwrap().is_none());
    }
}
