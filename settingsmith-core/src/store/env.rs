//! Credentials supplied through environment variables.
//!
//! Two forms are recognized for a credential id `nexus-deploy` and the
//! default prefix `SETTINGSMITH`:
//!
//! - `SETTINGSMITH_NEXUS_DEPLOY` holding a JSON credential document
//! - `SETTINGSMITH_NEXUS_DEPLOY_USERNAME` and `SETTINGSMITH_NEXUS_DEPLOY_PASSWORD`
//!   holding a plain username/password pair
//!
//! The JSON form wins when both are present.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{CredentialStore, Secret, StoreError, decode_credential};
use crate::credential::Credential;
use crate::execution::Execution;
use crate::model::CredentialId;

/// Credential store reading environment variables.
///
/// Variables are snapshotted at construction so lookups do not race with
/// later changes to the process environment.
pub struct EnvCredentialStore {
    prefix: String,
    vars: HashMap<String, Secret>,
}

impl EnvCredentialStore {
    /// Snapshot the process environment.
    pub fn from_env(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let wanted = format!("{}_", prefix.to_uppercase());
        let vars = std::env::vars()
            .filter(|(k, _)| k.starts_with(&wanted))
            .map(|(k, v)| (k, Secret::new(v)))
            .collect();
        Self { prefix, vars }
    }

    /// Use an explicit variable set instead of the process environment.
    pub fn with_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), Secret::new(v)))
                .collect(),
        }
    }

    /// Environment variable name for a credential id.
    ///
    /// Non-alphanumeric characters become `_` and the result is uppercased.
    pub fn var_name(&self, credential_id: &CredentialId) -> String {
        let normalized: String = credential_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}_{}", self.prefix.to_uppercase(), normalized)
    }
}

impl std::fmt::Debug for EnvCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentialStore")
            .field("prefix", &self.prefix)
            .field("vars_count", &self.vars.len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn lookup(
        &self,
        _execution: &Execution,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        let name = self.var_name(credential_id);

        if let Some(document) = self.vars.get(&name) {
            return decode_credential(&name, document.expose()).map(Some);
        }

        let username = self.vars.get(&format!("{}_USERNAME", name));
        let password = self.vars.get(&format!("{}_PASSWORD", name));
        match (username, password) {
            (Some(username), Some(password)) => Ok(Some(Credential::UsernamePassword {
                username: username.expose().to_string(),
                password: password.clone(),
            })),
            _ => Ok(None),
        }
    }
}
